//! Pooled database handle with primary/replica failover.
//!
//! [`Database`] ties the pieces together: statements run on a connection
//! checked out of the [`ConnectionPool`]; new physical connections are opened
//! through the [`FailoverController`] and prepared by a
//! [`SessionInitializer`]; a statement that hits a broken connection is
//! re-run exactly once on a fresh connection.
//!
//! ```rust,ignore
//! let db = Database::open(MySqlConnector::new(), "mysql+pool://root:pw@10.0.0.1/app", Some("mysql+pool://root:pw@10.0.0.2/app"))?;
//! let rows = db.execute("SELECT id, name FROM users WHERE id = ?", &[json!(1)])?;
//! ```

mod driver;
mod failover;
mod plugin;
mod pool;
mod query;
mod retry;
mod session;
mod url;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

pub use driver::{Connection, Connector, DriverError, DriverErrorKind, ResultSet, Row};
pub use failover::{FailoverController, FailoverState};
pub use plugin::DatabasePlugin;
pub use pool::{ConnId, ConnectionPool, PoolConfig, PoolStatus, PooledConnection};
pub use query::{Page, Pager, Record, SqlQuery};
pub use retry::{
    MySqlRetryPolicy, PostgresRetryPolicy, RetryPolicy, MYSQL_CONN_HOST_ERROR,
    POSTGRES_CONNECT_SQLSTATES,
};
pub use session::{SessionInitializer, SessionSettings};
pub use url::{Backend, ConnectionConfig, DatabaseUrl};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error("unsupported database scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),
    #[error("`[database] {0}` is not configured")]
    NotConfigured(&'static str),
    #[error("no connection available (max {max}) after waiting {waited:?}")]
    PoolExhausted { max: usize, waited: Duration },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub struct Database<K: Connector> {
    connector: K,
    backend: Backend,
    pool: ConnectionPool<K::Conn>,
    failover: FailoverController,
    policy: Arc<dyn RetryPolicy>,
    session: Box<dyn SessionInitializer<K::Conn>>,
    autocommit: bool,
}

impl<K: Connector> Database<K> {
    /// Parses `url` (and the optional replica url) and builds a handle with
    /// the backend's default retry policy and session settings.
    pub fn open(connector: K, url: &str, replica_url: Option<&str>) -> DatabaseResult<Self> {
        let primary = DatabaseUrl::parse(url)?;
        let replica = replica_url
            .filter(|u| !u.trim().is_empty())
            .map(DatabaseUrl::parse)
            .transpose()?
            .map(|r| r.connection);
        if let Some(replica) = &replica {
            if replica.backend != primary.connection.backend {
                return Err(DatabaseError::InvalidUrl(format!(
                    "replica backend {} does not match primary backend {}",
                    replica.backend, primary.connection.backend
                )));
            }
        }
        Ok(Self::from_parts(connector, primary, replica))
    }

    /// Reads `[database] db_url` and the optional `[database] slave_url`.
    pub fn from_config(connector: K, config: &Config) -> DatabaseResult<Self> {
        let url = config
            .get_option("database", "db_url", None)
            .ok_or(DatabaseError::NotConfigured("db_url"))?;
        let replica = config.get_option("database", "slave_url", None);
        Self::open(connector, &url, replica.as_deref())
    }

    pub fn from_parts(connector: K, primary: DatabaseUrl, replica: Option<ConnectionConfig>) -> Self {
        let backend = primary.connection.backend;
        let policy = backend.retry_policy();
        Self {
            connector,
            backend,
            pool: ConnectionPool::new(primary.pool),
            failover: FailoverController::new(primary.connection, replica, policy.clone()),
            policy,
            session: Box::new(backend.session_settings()),
            autocommit: true,
        }
    }

    pub fn with_session<S>(mut self, session: S) -> Self
    where
        S: SessionInitializer<K::Conn> + 'static,
    {
        self.session = Box::new(session);
        self
    }

    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.failover = FailoverController::new(
            self.failover.primary().clone(),
            self.failover.replica().cloned(),
            policy.clone(),
        );
        self.policy = policy;
        self
    }

    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn failover_state(&self) -> FailoverState {
        self.failover.state()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn close_idle(&self) -> usize {
        self.pool.close_idle()
    }

    /// Runs a statement, committing when the handle is in autocommit mode.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DatabaseResult<ResultSet> {
        self.execute_sql(sql, params, self.autocommit)
    }

    /// Runs a statement with at most one retry.
    ///
    /// A broken-connection error discards the connection, opens a new one
    /// (failing over if the primary is unreachable) and runs the same
    /// statement again. The second failure, or any other error class, is
    /// returned unchanged.
    pub fn execute_sql(&self, sql: &str, params: &[Value], commit: bool) -> DatabaseResult<ResultSet> {
        let mut conn = self.pool.checkout(|| self.connect())?;
        let err = match run(&mut *conn, sql, params, commit) {
            Ok(rows) => {
                self.pool.checkin(conn, false);
                return Ok(rows);
            }
            Err(err) => err,
        };

        if !self.policy.should_reconnect(&err) {
            self.pool.checkin(conn, false);
            return Err(err.into());
        }

        warn!(id = %conn.id(), error = %err, "database connection broken, reconnecting");
        self.pool.checkin(conn, true);

        let mut conn = self.pool.checkout_new(|| self.connect())?;
        debug!(id = %conn.id(), "retrying statement on new connection");
        match run(&mut *conn, sql, params, commit) {
            Ok(rows) => {
                self.pool.checkin(conn, false);
                Ok(rows)
            }
            Err(err) => {
                let broken = self.policy.should_reconnect(&err);
                self.pool.checkin(conn, broken);
                Err(err.into())
            }
        }
    }

    fn connect(&self) -> Result<K::Conn, DriverError> {
        let mut conn = self.failover.connect(&self.connector)?;
        if let Err(err) = self.session.initialize(&mut conn) {
            conn.close();
            return Err(err);
        }
        debug!(endpoint = %self.failover.target().address(), "created new database connection");
        Ok(conn)
    }
}

fn run<C: Connection>(conn: &mut C, sql: &str, params: &[Value], commit: bool) -> Result<ResultSet, DriverError> {
    let rows = conn.execute(sql, params)?;
    if commit {
        conn.commit()?;
    }
    Ok(rows)
}
