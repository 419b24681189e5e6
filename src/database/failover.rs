use std::sync::{Arc, Mutex, PoisonError};

use tracing::error;

use super::driver::{Connector, DriverError};
use super::retry::RetryPolicy;
use super::url::ConnectionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    Primary,
    Replica,
}

/// Chooses the endpoint for new connections. Switches from the primary to
/// the replica at most once per handle and never switches back.
#[derive(Debug)]
pub struct FailoverController {
    primary: ConnectionConfig,
    replica: Option<ConnectionConfig>,
    policy: Arc<dyn RetryPolicy>,
    state: Mutex<FailoverState>,
}

impl FailoverController {
    pub fn new(
        primary: ConnectionConfig,
        replica: Option<ConnectionConfig>,
        policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            primary,
            replica,
            policy,
            state: Mutex::new(FailoverState::Primary),
        }
    }

    pub fn state(&self) -> FailoverState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn primary(&self) -> &ConnectionConfig {
        &self.primary
    }

    pub fn replica(&self) -> Option<&ConnectionConfig> {
        self.replica.as_ref()
    }

    /// Endpoint new connections currently go to.
    pub fn target(&self) -> &ConnectionConfig {
        self.endpoint(self.state())
    }

    fn endpoint(&self, state: FailoverState) -> &ConnectionConfig {
        match (state, &self.replica) {
            (FailoverState::Replica, Some(replica)) => replica,
            _ => &self.primary,
        }
    }

    /// Opens a connection to the current target. A qualifying error while
    /// still on the primary flips the handle to the replica and tries there
    /// once; any other error is returned untouched.
    ///
    /// The endpoint and the failover decision come from one reading of the
    /// state, so a caller racing a switch never tries the replica twice.
    pub fn connect<K: Connector>(&self, connector: &K) -> Result<K::Conn, DriverError> {
        let attempted = self.state();
        let err = match connector.connect(self.endpoint(attempted)) {
            Ok(conn) => return Ok(conn),
            Err(err) => err,
        };

        let Some(replica) = &self.replica else {
            return Err(err);
        };
        if attempted == FailoverState::Replica || !self.policy.should_failover(&err) {
            return Err(err);
        }

        self.switch_to_replica(&err);
        connector.connect(replica)
    }

    /// Flips to the replica. Returns `true` only for the caller that
    /// performed the transition; concurrent callers observe it and skip.
    pub fn switch_to_replica(&self, cause: &DriverError) -> bool {
        let Some(replica) = &self.replica else {
            return false;
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == FailoverState::Replica {
            return false;
        }
        *state = FailoverState::Replica;
        error!(
            primary = %self.primary.address(),
            replica = %replica.address(),
            cause = %cause,
            "primary database unreachable, using replica"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::driver::{Connection, DriverErrorKind, ResultSet};
    use crate::database::retry::MySqlRetryPolicy;
    use crate::database::url::DatabaseUrl;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug)]
    struct Conn(String);

    impl Connection for Conn {
        fn execute(&mut self, _: &str, _: &[Value]) -> Result<ResultSet, DriverError> {
            Ok(ResultSet::default())
        }
        fn commit(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn ping(&mut self) -> bool {
            true
        }
        fn close(&mut self) {}
    }

    /// Refuses (or rejects) every connection to `down_host`.
    struct HostConnector {
        down_host: &'static str,
        error: DriverError,
        attempts: AtomicUsize,
        replica_attempts: AtomicUsize,
    }

    impl HostConnector {
        fn new(down_host: &'static str, error: DriverError) -> Self {
            Self {
                down_host,
                error,
                attempts: AtomicUsize::new(0),
                replica_attempts: AtomicUsize::new(0),
            }
        }
    }

    impl Connector for HostConnector {
        type Conn = Conn;

        fn connect(&self, config: &ConnectionConfig) -> Result<Conn, DriverError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if config.host == "replica" {
                self.replica_attempts.fetch_add(1, Ordering::SeqCst);
            }
            if config.host == self.down_host {
                Err(self.error.clone())
            } else {
                Ok(Conn(config.host.clone()))
            }
        }
    }

    fn refused() -> DriverError {
        DriverError::operational("Can't connect to MySQL server").with_code(2003)
    }

    fn controller(with_replica: bool) -> FailoverController {
        let primary = DatabaseUrl::parse("mysql+pool://u:p@primary/app").unwrap();
        let replica = DatabaseUrl::parse("mysql+pool://u:p@replica/app").unwrap();
        FailoverController::new(
            primary.connection,
            with_replica.then_some(replica.connection),
            Arc::new(MySqlRetryPolicy),
        )
    }

    #[test]
    fn refused_primary_switches_to_replica() {
        let failover = controller(true);
        let connector = HostConnector::new("primary", refused());

        let conn = failover.connect(&connector).unwrap();
        assert_eq!(conn.0, "replica");
        assert_eq!(failover.state(), FailoverState::Replica);
        assert_eq!(failover.target().host, "replica");

        failover.connect(&connector).unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn auth_failure_does_not_switch() {
        let failover = controller(true);
        let denied = DriverError::new(DriverErrorKind::Authentication, "Access denied").with_code(1045);
        let connector = HostConnector::new("primary", denied.clone());

        let err = failover.connect(&connector).unwrap_err();
        assert_eq!(err, denied);
        assert_eq!(failover.state(), FailoverState::Primary);
    }

    #[test]
    fn no_replica_means_error_propagates() {
        let failover = controller(false);
        let connector = HostConnector::new("primary", refused());

        assert_eq!(failover.connect(&connector).unwrap_err(), refused());
        assert_eq!(failover.state(), FailoverState::Primary);
        assert!(!failover.switch_to_replica(&refused()));
    }

    #[test]
    fn replica_failure_is_not_retried() {
        let failover = controller(true);
        assert!(failover.switch_to_replica(&refused()));
        let connector = HostConnector::new("replica", refused());

        assert!(failover.connect(&connector).is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(failover.state(), FailoverState::Replica);
    }

    #[test]
    fn concurrent_failures_switch_exactly_once() {
        let failover = Arc::new(controller(true));
        let switches: usize = (0..16)
            .map(|_| {
                let failover = failover.clone();
                thread::spawn(move || failover.switch_to_replica(&refused()))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(switches, 1);
        assert_eq!(failover.state(), FailoverState::Replica);
    }

    #[test]
    fn concurrent_refused_connects_all_land_on_the_replica() {
        const CALLERS: usize = 16;
        let failover = controller(true);
        let connector = HostConnector::new("primary", refused());
        let barrier = std::sync::Barrier::new(CALLERS);

        let hosts: Vec<String> = thread::scope(|scope| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        failover.connect(&connector).map(|conn| conn.0)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });

        assert!(hosts.iter().all(|host| host == "replica"));
        assert_eq!(failover.state(), FailoverState::Replica);
        assert!(!failover.switch_to_replica(&refused()));
        assert_eq!(connector.replica_attempts.load(Ordering::SeqCst), CALLERS);
        assert!(connector.attempts.load(Ordering::SeqCst) <= 2 * CALLERS);
    }
}
