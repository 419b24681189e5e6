//! Driver-facing traits.
//!
//! A driver binding (MySQL, PostgreSQL, or a test double) implements
//! [`Connector`] and [`Connection`]. Both are plain blocking calls that never
//! retry on their own; retry and failover decisions live in the layers above.

use serde_json::{Map, Value};
use thiserror::Error;

use super::url::ConnectionConfig;

pub type Row = Vec<Value>;

/// Rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected: u64,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let affected = rows.len() as u64;
        Self {
            columns,
            rows,
            affected,
        }
    }

    pub fn with_affected(affected: u64) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The client side of the connection is unusable (closed socket, broken pipe).
    Interface,
    /// The server went away or refused the operation for operational reasons.
    Operational,
    /// Syntax errors, unknown tables and other statement mistakes.
    Programming,
    /// Constraint violations.
    Integrity,
    Authentication,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct DriverError {
    pub kind: DriverErrorKind,
    /// Vendor error number (MySQL `errno`).
    pub code: Option<u32>,
    /// Five character SQLSTATE, when the driver reports one.
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Interface, message)
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Operational, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Programming, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Integrity, message)
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::Interface | DriverErrorKind::Operational
        )
    }
}

/// A live database session.
pub trait Connection: Send + 'static {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet, DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    /// Cheap round trip used to decide whether an idle connection may be reused.
    fn ping(&mut self) -> bool;

    fn close(&mut self);
}

/// Opens raw connections. Never retries and never fails over.
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Conn, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_zip_columns_and_values() {
        let set = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![vec![json!(1), json!("ann")], vec![json!(2), json!("bob")]],
        );
        let records = set.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["name"], json!("bob"));
        assert_eq!(set.affected, 2);
    }

    #[test]
    fn display_includes_vendor_code() {
        let err = DriverError::operational("Can't connect").with_code(2003);
        assert_eq!(err.to_string(), "Operational error (2003): Can't connect");
        let err = DriverError::programming("syntax");
        assert_eq!(err.to_string(), "Programming error: syntax");
    }
}
