use std::sync::Arc;

use serde_json::Value;

use crate::database::{Connector, Database, DatabaseResult, FailoverState, ResultSet};

/// Shares one [`Database`] handle between handlers through the request
/// plugin map.
pub struct DatabasePlugin<K: Connector> {
    db: Arc<Database<K>>,
}

impl<K: Connector> DatabasePlugin<K> {
    pub fn new(db: Database<K>) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn database(&self) -> &Database<K> {
        &self.db
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> DatabaseResult<ResultSet> {
        self.db.execute(sql, params)
    }

    pub fn failover_state(&self) -> FailoverState {
        self.db.failover_state()
    }
}

impl<K: Connector> Clone for DatabasePlugin<K> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}
