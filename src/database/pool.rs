use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::driver::{Connection, DriverError};
use super::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on checked-out connections. `None` means unbounded.
    pub max_connections: Option<usize>,
    /// Idle connections older than this are closed instead of reused.
    /// A zero timeout makes every returned connection stale.
    pub stale_timeout: Option<Duration>,
    /// How long `checkout` waits for a free slot. `None` fails immediately.
    pub wait_timeout: Option<Duration>,
    /// Keep returned connections around. Off for non-pooled schemes.
    pub reuse: bool,
}

impl PoolConfig {
    pub fn unpooled() -> Self {
        Self {
            max_connections: None,
            stale_timeout: None,
            wait_timeout: None,
            reuse: false,
        }
    }

    fn is_stale(&self, since: Instant) -> bool {
        match self.stale_timeout {
            Some(timeout) => timeout.is_zero() || since.elapsed() > timeout,
            None => false,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: Some(20),
            stale_timeout: None,
            wait_timeout: None,
            reuse: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connection checked out of a [`ConnectionPool`]. Exclusive to its holder
/// until it is handed back with [`ConnectionPool::checkin`].
#[derive(Debug)]
pub struct PooledConnection<C> {
    id: ConnId,
    created_at: Instant,
    conn: C,
}

impl<C> PooledConnection<C> {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

struct IdleEntry<C> {
    returned_at: Instant,
    id: ConnId,
    created_at: Instant,
    conn: C,
}

// BinaryHeap is a max-heap; invert so the oldest return time pops first.
impl<C> Ord for IdleEntry<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .returned_at
            .cmp(&self.returned_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<C> PartialOrd for IdleEntry<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> PartialEq for IdleEntry<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<C> Eq for IdleEntry<C> {}

struct PoolState<C> {
    idle: BinaryHeap<IdleEntry<C>>,
    /// Checked-out (or currently connecting) ids, with the timestamp the
    /// connection carried when it left the idle heap.
    in_use: HashMap<ConnId, Instant>,
    next_id: u64,
}

impl<C> PoolState<C> {
    fn reserve(&mut self) -> ConnId {
        self.next_id += 1;
        let id = ConnId(self.next_id);
        self.in_use.insert(id, Instant::now());
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    pub max: Option<usize>,
}

/// Fixed-capacity set of connections. Idle connections sit in a min-heap
/// keyed by the time they were returned; staleness is checked lazily on
/// checkin and checkout, never by a background sweeper.
pub struct ConnectionPool<C: Connection> {
    state: Mutex<PoolState<C>>,
    available: Condvar,
    config: PoolConfig,
}

impl<C: Connection> ConnectionPool<C> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: BinaryHeap::new(),
                in_use: HashMap::new(),
                next_id: 0,
            }),
            available: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Hands out an idle connection, or opens one through `connect` when none
    /// is reusable. Blocks up to `wait_timeout` while the pool is at capacity.
    pub fn checkout<F>(&self, connect: F) -> Result<PooledConnection<C>, DatabaseError>
    where
        F: FnOnce() -> Result<C, DriverError>,
    {
        self.acquire(connect, true)
    }

    /// Like [`checkout`](Self::checkout) but always opens a new physical
    /// connection, still subject to the capacity limit.
    pub fn checkout_new<F>(&self, connect: F) -> Result<PooledConnection<C>, DatabaseError>
    where
        F: FnOnce() -> Result<C, DriverError>,
    {
        self.acquire(connect, false)
    }

    fn acquire<F>(&self, connect: F, reuse_idle: bool) -> Result<PooledConnection<C>, DatabaseError>
    where
        F: FnOnce() -> Result<C, DriverError>,
    {
        let started = Instant::now();
        let mut state = self.lock();
        let id = loop {
            let idle = if reuse_idle {
                self.pop_idle(&mut state)
            } else {
                None
            };
            if let Some(entry) = idle {
                state.in_use.insert(entry.id, entry.returned_at);
                drop(state);

                let mut pooled = PooledConnection {
                    id: entry.id,
                    created_at: entry.created_at,
                    conn: entry.conn,
                };
                if pooled.conn.ping() {
                    trace!(id = %pooled.id, "reusing idle connection");
                    return Ok(pooled);
                }
                debug!(id = %pooled.id, "idle connection failed ping, closing");
                pooled.conn.close();
                state = self.lock();
                state.in_use.remove(&pooled.id);
                continue;
            }

            if self.has_capacity(&state) {
                break state.reserve();
            }

            let max = self.config.max_connections.unwrap_or_default();
            let Some(wait) = self.config.wait_timeout else {
                return Err(DatabaseError::PoolExhausted {
                    max,
                    waited: Duration::ZERO,
                });
            };
            let elapsed = started.elapsed();
            if elapsed >= wait {
                return Err(DatabaseError::PoolExhausted { max, waited: elapsed });
            }
            state = self
                .available
                .wait_timeout(state, wait - elapsed)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };
        drop(state);

        match connect() {
            Ok(conn) => {
                let now = Instant::now();
                self.lock().in_use.insert(id, now);
                debug!(id = %id, "opened new pooled connection");
                Ok(PooledConnection {
                    id,
                    created_at: now,
                    conn,
                })
            }
            Err(err) => {
                self.lock().in_use.remove(&id);
                self.available.notify_one();
                Err(err.into())
            }
        }
    }

    /// Returns a connection. With `discard` the connection is closed
    /// unconditionally; otherwise it is closed only when stale.
    pub fn checkin(&self, pooled: PooledConnection<C>, discard: bool) {
        let PooledConnection {
            id,
            created_at,
            mut conn,
        } = pooled;

        let mut state = self.lock();
        let since = state.in_use.remove(&id).unwrap_or(created_at);
        if discard || !self.config.reuse || self.config.is_stale(since) {
            drop(state);
            if discard {
                debug!(id = %id, "discarding broken connection");
            } else if self.config.reuse {
                debug!(id = %id, "closing stale connection");
            }
            conn.close();
        } else {
            trace!(id = %id, "returning connection to pool");
            state.idle.push(IdleEntry {
                returned_at: Instant::now(),
                id,
                created_at,
                conn,
            });
        }
        self.available.notify_one();
    }

    /// Closes every idle connection. Checked-out connections are untouched.
    pub fn close_idle(&self) -> usize {
        let idle: Vec<_> = self.lock().idle.drain().collect();
        let closed = idle.len();
        for mut entry in idle {
            entry.conn.close();
        }
        closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.lock();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            max: self.config.max_connections,
        }
    }

    fn pop_idle(&self, state: &mut PoolState<C>) -> Option<IdleEntry<C>> {
        while let Some(mut entry) = state.idle.pop() {
            if self.config.is_stale(entry.returned_at) {
                debug!(id = %entry.id, "closing stale connection");
                entry.conn.close();
                continue;
            }
            return Some(entry);
        }
        None
    }

    fn has_capacity(&self, state: &PoolState<C>) -> bool {
        self.config
            .max_connections
            .map_or(true, |max| state.in_use.len() < max)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connection> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        self.close_idle();
    }
}
