//! Elastic pool.
//!
//! Connections are opened on demand up to a cap. Released connections go
//! to the front of the idle list and are reused first, so the back of the
//! list holds the connections idle for longest; housekeeping evicts stale
//! connections from there and gives their capacity back.
//!
//! Two semaphores track the pool: `capacity` counts connections that may
//! still be opened, `idle` counts entries of the idle list. A permit of
//! `idle` is always taken before popping from the list and returned after
//! pushing to it.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{PoolKind, DEFAULT_MAX_CONNECTION_AGE, DEFAULT_MAX_CONNECTION_IDLE};
use crate::connection::{ConnectionFactory, PooledConnection};
use crate::error::{PoolError, PoolResult};
use crate::semaphore::Semaphore;
use crate::strategy::{ConnectionCounts, PoolStrategy};

#[derive(Debug, Default)]
struct ElasticState {
    idle: VecDeque<PooledConnection>,
    total: usize,
    created: u64,
    evicted: u64,
    open: bool,
}

/// A pool of at most `max_connections` connections, opened on demand.
#[derive(Debug)]
pub struct ElasticStrategy {
    max_connections: usize,
    max_age: Duration,
    max_idle: Duration,
    capacity: Semaphore,
    idle: Semaphore,
    state: Mutex<ElasticState>,
}

impl ElasticStrategy {
    /// Creates a strategy capped at `max_connections`.
    pub fn new(max_connections: usize) -> PoolResult<Self> {
        if max_connections == 0 {
            return Err(PoolError::Configuration(
                "an elastic pool needs a maximum of at least one connection".to_string(),
            ));
        }

        Ok(Self {
            max_connections,
            max_age: DEFAULT_MAX_CONNECTION_AGE,
            max_idle: DEFAULT_MAX_CONNECTION_IDLE,
            capacity: Semaphore::new(max_connections),
            idle: Semaphore::new(0),
            state: Mutex::new(ElasticState::default()),
        })
    }

    /// Sets the eviction thresholds.
    pub fn with_eviction(mut self, max_age: Duration, max_idle: Duration) -> Self {
        self.max_age = max_age;
        self.max_idle = max_idle;
        self
    }

    /// Maximum number of connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    fn is_stale(&self, connection: &PooledConnection) -> bool {
        connection.age() > self.max_age || connection.idle_time() > self.max_idle
    }

    fn pop_idle(&self) -> PoolResult<PooledConnection> {
        self.state.lock().idle.pop_front().ok_or_else(|| {
            PoolError::Consistency("idle semaphore granted with an empty idle list".to_string())
        })
    }

    fn create(&self, factory: &ConnectionFactory<'_>) -> PoolResult<PooledConnection> {
        match factory.open() {
            Ok(connection) => {
                let mut state = self.state.lock();
                state.total += 1;
                state.created += 1;
                debug!(connection = connection.id(), total = state.total, "Grew elastic pool");
                Ok(connection)
            }
            Err(err) => {
                self.capacity.release(1);
                Err(err)
            }
        }
    }

    fn push_idle(&self, mut connection: PooledConnection) {
        connection.touch();
        self.state.lock().idle.push_front(connection);
        self.idle.release(1);
    }

    fn drain_idle(&self) -> Vec<PooledConnection> {
        let mut drained = Vec::new();
        while self.idle.try_acquire() {
            let mut state = self.state.lock();
            if let Some(connection) = state.idle.pop_front() {
                state.total -= 1;
                drained.push(connection);
            }
        }
        self.capacity.release(drained.len());
        drained
    }
}

impl PoolStrategy for ElasticStrategy {
    fn kind(&self) -> PoolKind {
        PoolKind::Elastic
    }

    fn open(&self, factory: &ConnectionFactory<'_>) -> PoolResult<()> {
        self.state.lock().open = true;

        // One connection is opened eagerly to prepare the database
        if !self.capacity.try_acquire() {
            return Err(PoolError::Consistency(
                "no capacity left when opening the pool".to_string(),
            ));
        }
        let mut connection = self.create(factory)?;
        if let Err(err) = factory.configure(&mut connection) {
            self.state.lock().total -= 1;
            self.capacity.release(1);
            connection.close();
            return Err(err);
        }
        self.push_idle(connection);

        info!(max_connections = self.max_connections, "Opened elastic pool");
        Ok(())
    }

    fn acquire(
        &self,
        factory: &ConnectionFactory<'_>,
        timeout: Duration,
    ) -> PoolResult<Option<PooledConnection>> {
        if self.idle.try_acquire() {
            return self.pop_idle().map(Some);
        }

        if self.capacity.try_acquire() {
            return self.create(factory).map(Some);
        }

        // Saturated: wait for a release
        if self.idle.acquire_timeout(timeout) {
            return self.pop_idle().map(Some);
        }
        Ok(None)
    }

    fn release(&self, mut connection: PooledConnection) {
        let mut state = self.state.lock();
        if state.open {
            connection.touch();
            state.idle.push_front(connection);
            drop(state);
            self.idle.release(1);
        } else {
            state.total -= 1;
            drop(state);
            self.capacity.release(1);
            connection.close();
        }
    }

    fn discard(&self, _factory: &ConnectionFactory<'_>, connection: PooledConnection) {
        {
            let mut state = self.state.lock();
            state.total = state.total.saturating_sub(1);
        }
        self.capacity.release(1);
        debug!(connection = connection.id(), "Discarded connection");
        connection.close();
    }

    fn close(&self) -> PoolResult<()> {
        self.force_close();
        info!("Closed elastic pool");
        Ok(())
    }

    fn force_close(&self) {
        self.state.lock().open = false;
        let drained = self.drain_idle();
        let closed = drained.len();
        drained.into_iter().for_each(PooledConnection::close);

        let remaining = self.state.lock().total;
        if remaining > 0 {
            debug!(closed, remaining, "Connections still in use will close on release");
        }
    }

    fn housekeeping(&self) {
        let mut evicted = 0;

        while self.idle.try_acquire() {
            let mut state = self.state.lock();
            let Some(connection) = state.idle.pop_back() else {
                break;
            };

            if self.is_stale(&connection) {
                state.total -= 1;
                state.evicted += 1;
                drop(state);
                debug!(
                    connection = connection.id(),
                    age_s = connection.age().as_secs(),
                    idle_ms = connection.idle_time().as_millis() as u64,
                    "Evicting idle connection"
                );
                connection.close();
                self.capacity.release(1);
                evicted += 1;
            } else {
                // The list is ordered by release time: the rest is fresher
                state.idle.push_back(connection);
                drop(state);
                self.idle.release(1);
                break;
            }
        }

        if evicted > 0 {
            info!(evicted, "Evicted idle connections");
        }
    }

    fn counts(&self) -> ConnectionCounts {
        let state = self.state.lock();
        ConnectionCounts {
            total: state.total,
            idle: state.idle.len(),
            created: state.created,
            evicted: state.evicted,
        }
    }
}
