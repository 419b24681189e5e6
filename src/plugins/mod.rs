use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared values handed to every request, keyed by type.
#[derive(Default, Debug, Clone)]
pub struct Plugins {
    data: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any earlier value of the same type. Requests already holding
    /// a clone keep seeing the old map.
    pub fn insert<T: 'static + Send + Sync>(&mut self, value: T) {
        Arc::make_mut(&mut self.data).insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_found_by_type() {
        let mut plugins = Plugins::new();
        plugins.insert(42u32);
        plugins.insert(String::from("db"));
        let snapshot = plugins.clone();
        plugins.insert(7u32);

        assert_eq!(plugins.get::<u32>(), Some(&7));
        assert_eq!(snapshot.get::<u32>(), Some(&42));
        assert_eq!(plugins.get::<String>().map(String::as_str), Some("db"));
        assert_eq!(plugins.get::<i64>(), None);
    }
}
