//! Error classification strategies.
//!
//! A [`RetryPolicy`] answers two questions for a backend: does this connect
//! error allow switching to the replica, and does this execute error mean the
//! connection is broken and the statement may be re-run once.

use std::fmt;

use super::driver::DriverError;

pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// `true` only for the enumerated "could not reach the server" conditions.
    fn should_failover(&self, err: &DriverError) -> bool;

    /// `true` when the connection used for a statement is no longer usable.
    fn should_reconnect(&self, err: &DriverError) -> bool {
        err.is_connection_error()
    }
}

/// `CR_CONN_HOST_ERROR`: "Can't connect to MySQL server".
pub const MYSQL_CONN_HOST_ERROR: u32 = 2003;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlRetryPolicy;

impl RetryPolicy for MySqlRetryPolicy {
    fn should_failover(&self, err: &DriverError) -> bool {
        err.code == Some(MYSQL_CONN_HOST_ERROR)
    }
}

/// SQLSTATEs for "unable to establish connection" and "connection failure".
pub const POSTGRES_CONNECT_SQLSTATES: [&str; 2] = ["08001", "08006"];

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresRetryPolicy;

impl RetryPolicy for PostgresRetryPolicy {
    fn should_failover(&self, err: &DriverError) -> bool {
        err.sqlstate
            .as_deref()
            .is_some_and(|state| POSTGRES_CONNECT_SQLSTATES.contains(&state))
    }
}
