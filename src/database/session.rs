use super::driver::{Connection, DriverError};

/// Runs once on every physical connection, right after connect and before
/// the connection is handed to the pool.
pub trait SessionInitializer<C: Connection>: Send + Sync {
    fn initialize(&self, conn: &mut C) -> Result<(), DriverError>;
}

/// Fixed list of session statements, executed in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    statements: Vec<String>,
}

impl SessionSettings {
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl<C: Connection> SessionInitializer<C> for SessionSettings {
    fn initialize(&self, conn: &mut C) -> Result<(), DriverError> {
        for statement in &self.statements {
            conn.execute(statement, &[])?;
        }
        Ok(())
    }
}

impl<C, F> SessionInitializer<C> for F
where
    C: Connection,
    F: Fn(&mut C) -> Result<(), DriverError> + Send + Sync,
{
    fn initialize(&self, conn: &mut C) -> Result<(), DriverError> {
        (self)(conn)
    }
}
