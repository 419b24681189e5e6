use futures::future::BoxFuture;
use moka::future::Cache;
use moka::Expiry;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ServerError, ServerResult};

pub type Fields = HashMap<String, String>;

/// Key/value backend with string values and hash values.
pub trait CacheStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    /// `expire` of `None` keeps the value until it is evicted or deleted.
    fn set<'a>(&'a self, key: &'a str, value: String, expire: Option<Duration>) -> BoxFuture<'a, ()>;

    fn hgetall<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Fields>;

    /// Merges `fields` into the hash at `key`.
    fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BoxFuture<'a, ()>;

    fn hdel<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, bool>;

    /// Returns how many of `keys` existed.
    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, usize>;
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Str(String, Option<Duration>),
    Hash(Fields),
}

impl Entry {
    fn ttl(&self) -> Option<Duration> {
        match self {
            Entry::Str(_, ttl) => *ttl,
            Entry::Hash(_) => None,
        }
    }
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl()
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl()
    }
}

/// In-process [`CacheStore`] on a bounded moka cache.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, Entry>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            match self.cache.get(key).await {
                Some(Entry::Str(value, _)) => Some(value),
                _ => None,
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, expire: Option<Duration>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.cache.insert(key.to_owned(), Entry::Str(value, expire)).await;
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Fields> {
        Box::pin(async move {
            match self.cache.get(key).await {
                Some(Entry::Hash(fields)) => fields,
                _ => Fields::new(),
            }
        })
    }

    fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.cache
                .entry(key.to_owned())
                .and_upsert_with(|existing| async move {
                    let mut merged = match existing.map(|e| e.into_value()) {
                        Some(Entry::Hash(current)) => current,
                        _ => Fields::new(),
                    };
                    merged.extend(fields);
                    Entry::Hash(merged)
                })
                .await;
        })
    }

    fn hdel<'a>(&'a self, key: &'a str, field: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(Entry::Hash(mut fields)) = self.cache.get(key).await else {
                return false;
            };
            if fields.remove(field).is_none() {
                return false;
            }
            if fields.is_empty() {
                self.cache.invalidate(key).await;
            } else {
                self.cache.insert(key.to_owned(), Entry::Hash(fields)).await;
            }
            true
        })
    }

    fn delete<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            let mut removed = 0;
            for key in keys {
                if self.cache.remove(key).await.is_some() {
                    removed += 1;
                }
            }
            removed
        })
    }
}

/// Plain string values.
#[derive(Clone)]
pub struct StrCache {
    store: Arc<dyn CacheStore>,
}

impl StrCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: impl Display) -> Option<String> {
        self.store.get(&key.to_string()).await
    }

    pub async fn get_or_404(&self, key: impl Display) -> ServerResult<String> {
        self.get(key)
            .await
            .filter(|value| !value.is_empty())
            .ok_or(ServerError::NotFound)
    }

    pub async fn set(&self, key: impl Display, value: impl Into<String>, expire: Option<Duration>) {
        self.store.set(&key.to_string(), value.into(), expire).await;
    }
}

/// How a stored string field is turned back into JSON on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Int,
    Float,
    Bool,
    /// JSON arrays and objects stored as text.
    Json,
}

impl Conversion {
    fn apply(self, raw: &str) -> Option<Value> {
        match self {
            Conversion::Int => raw.trim().parse::<i64>().ok().map(Value::from),
            Conversion::Float => raw.trim().parse::<f64>().ok().map(Value::from),
            Conversion::Bool => {
                let lower = raw.trim().to_ascii_lowercase();
                Some(Value::Bool(!matches!(lower.as_str(), "" | "false" | "0")))
            }
            Conversion::Json => {
                let trimmed = raw.trim();
                let bracketed = (trimmed.starts_with('[') && trimmed.ends_with(']'))
                    || (trimmed.starts_with('{') && trimmed.ends_with('}'));
                if bracketed {
                    serde_json::from_str(trimmed).ok()
                } else {
                    Some(Value::Null)
                }
            }
        }
    }
}

/// Records stored as hashes under a key template such as `user:dict:{0}`.
///
/// `{0}` is replaced by the id; named placeholders like `{uid}` are filled
/// from the record itself by [`DictCache::set_cache`] and friends.
#[derive(Clone)]
pub struct DictCache {
    store: Arc<dyn CacheStore>,
    key_template: String,
    filters: Vec<String>,
    conversions: HashMap<String, Conversion>,
}

impl DictCache {
    pub const DEFAULT_TEMPLATE: &'static str = "default:dict:{0}";

    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            key_template: Self::DEFAULT_TEMPLATE.to_owned(),
            filters: Vec::new(),
            conversions: HashMap::from([("id".to_owned(), Conversion::Int)]),
        }
    }

    pub fn key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = template.into();
        self
    }

    /// Fields never written to the cache.
    pub fn filters<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn convert(mut self, field: impl Into<String>, conversion: Conversion) -> Self {
        self.conversions.insert(field.into(), conversion);
        self
    }

    pub fn key(&self, id: impl Display) -> String {
        self.key_template.replace("{0}", &id.to_string())
    }

    /// Fills named placeholders from `record`; `None` if one is missing.
    pub fn named_key(&self, record: &Map<String, Value>) -> Option<String> {
        let mut key = String::with_capacity(self.key_template.len());
        let mut rest = self.key_template.as_str();
        while let Some(start) = rest.find('{') {
            let end = start + rest[start..].find('}')?;
            key.push_str(&rest[..start]);
            let value = record.get(&rest[start + 1..end])?;
            key.push_str(&stringify(value));
            rest = &rest[end + 1..];
        }
        key.push_str(rest);
        Some(key)
    }

    pub async fn get(&self, id: impl Display) -> Option<Map<String, Value>> {
        let id = id.to_string();
        if id.is_empty() {
            return None;
        }
        self.load(&self.key(id)).await
    }

    pub async fn get_or_404(&self, id: impl Display) -> ServerResult<Map<String, Value>> {
        self.get(id).await.ok_or(ServerError::NotFound)
    }

    pub async fn get_cache(&self, lookup: &Map<String, Value>) -> Option<Map<String, Value>> {
        let key = self.named_key(lookup)?;
        self.load(&key).await
    }

    pub async fn set(&self, id: impl Display, record: &Map<String, Value>) {
        let fields = self.filtered(record);
        self.store.hset(&self.key(id), fields).await;
    }

    /// Stores `record` under the key built from its own fields.
    pub async fn set_cache(&self, record: &Map<String, Value>) -> ServerResult<()> {
        let key = self
            .named_key(record)
            .ok_or_else(|| ServerError::ValidationError(format!("record does not fill `{}`", self.key_template)))?;
        self.store.hset(&key, self.filtered(record)).await;
        Ok(())
    }

    pub async fn remove(&self, id: impl Display) -> bool {
        self.store.delete(&[self.key(id)]).await > 0
    }

    pub async fn removes<I>(&self, ids: I) -> usize
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let keys: Vec<String> = ids.into_iter().map(|id| self.key(id)).collect();
        self.store.delete(&keys).await
    }

    pub async fn remove_cache(&self, lookup: &Map<String, Value>) -> bool {
        match self.named_key(lookup) {
            Some(key) => self.store.delete(&[key]).await > 0,
            None => false,
        }
    }

    pub async fn remove_key(&self, id: impl Display, field: &str) -> bool {
        self.store.hdel(&self.key(id), field).await
    }

    async fn load(&self, key: &str) -> Option<Map<String, Value>> {
        let fields = self.store.hgetall(key).await;
        if fields.is_empty() {
            return None;
        }
        Some(
            fields
                .into_iter()
                .map(|(name, raw)| {
                    let value = match self.conversions.get(&name) {
                        Some(conversion) if !raw.is_empty() => {
                            conversion.apply(&raw).unwrap_or(Value::String(raw))
                        }
                        _ => Value::String(raw),
                    };
                    (name, value)
                })
                .collect(),
        )
    }

    fn filtered(&self, record: &Map<String, Value>) -> Fields {
        record
            .iter()
            .filter(|(name, _)| !self.filters.contains(name))
            .map(|(name, value)| (name.clone(), stringify(value)))
            .collect()
    }
}

/// Null becomes empty; strings are stored without quotes.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
