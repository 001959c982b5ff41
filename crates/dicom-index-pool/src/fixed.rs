//! Fixed-size pool.
//!
//! All connections are opened when the pool opens and live until it
//! closes. Callers wait on a queue of available connections.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::PoolKind;
use crate::connection::{ConnectionFactory, PooledConnection};
use crate::error::{PoolError, PoolResult};
use crate::strategy::{ConnectionCounts, PoolStrategy};

#[derive(Debug, Default)]
struct FixedState {
    available: VecDeque<PooledConnection>,
    total: usize,
    created: u64,
    open: bool,
}

/// A pool of exactly `count` connections.
#[derive(Debug)]
pub struct FixedStrategy {
    count: usize,
    state: Mutex<FixedState>,
    released: Condvar,
}

impl FixedStrategy {
    /// Creates a strategy holding `count` connections.
    pub fn new(count: usize) -> PoolResult<Self> {
        if count == 0 {
            return Err(PoolError::Configuration(
                "a fixed pool needs at least one connection".to_string(),
            ));
        }

        Ok(Self {
            count,
            state: Mutex::new(FixedState::default()),
            released: Condvar::new(),
        })
    }

    /// Number of connections held while open.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl PoolStrategy for FixedStrategy {
    fn kind(&self) -> PoolKind {
        PoolKind::Fixed
    }

    fn open(&self, factory: &ConnectionFactory<'_>) -> PoolResult<()> {
        let mut opened = Vec::with_capacity(self.count);

        for index in 0..self.count {
            let connection = factory.open().and_then(|mut connection| {
                if index == 0 {
                    factory.configure(&mut connection)?;
                }
                Ok(connection)
            });

            match connection {
                Ok(connection) => opened.push(connection),
                Err(err) => {
                    opened.into_iter().for_each(PooledConnection::close);
                    return Err(err);
                }
            }
        }

        let mut state = self.state.lock();
        state.total = opened.len();
        state.created += opened.len() as u64;
        state.available.extend(opened);
        state.open = true;
        info!(connections = self.count, "Opened fixed pool");
        Ok(())
    }

    fn acquire(
        &self,
        _factory: &ConnectionFactory<'_>,
        timeout: Duration,
    ) -> PoolResult<Option<PooledConnection>> {
        let mut state = self.state.lock();
        if state.available.is_empty() {
            self.released.wait_for(&mut state, timeout);
        }
        Ok(state.available.pop_front())
    }

    fn release(&self, connection: PooledConnection) {
        let mut state = self.state.lock();
        if !state.open {
            drop(state);
            connection.close();
            return;
        }

        state.available.push_back(connection);
        drop(state);
        self.released.notify_one();
    }

    fn discard(&self, factory: &ConnectionFactory<'_>, connection: PooledConnection) {
        let discarded = connection.id();
        connection.close();

        // A closed pool already forgot its connections
        if !self.state.lock().open {
            return;
        }

        match factory.open() {
            Ok(replacement) => {
                let mut state = self.state.lock();
                state.created += 1;
                if state.open {
                    debug!(discarded, replacement = replacement.id(), "Replaced connection");
                    state.available.push_back(replacement);
                    drop(state);
                    self.released.notify_one();
                } else {
                    drop(state);
                    replacement.close();
                }
            }
            Err(err) => {
                let mut state = self.state.lock();
                state.total = state.total.saturating_sub(1);
                warn!(
                    discarded,
                    total = state.total,
                    error = %err,
                    "Cannot replace connection, fixed pool shrinks"
                );
            }
        }
    }

    fn close(&self) -> PoolResult<()> {
        let mut state = self.state.lock();
        if state.available.len() != state.total {
            return Err(PoolError::Consistency(format!(
                "cannot close the pool: {} of {} connections are still in use",
                state.total - state.available.len(),
                state.total
            )));
        }

        state.open = false;
        state.total = 0;
        let connections: Vec<_> = state.available.drain(..).collect();
        drop(state);

        connections.into_iter().for_each(PooledConnection::close);
        info!("Closed fixed pool");
        Ok(())
    }

    fn force_close(&self) {
        let mut state = self.state.lock();
        let in_use = state.total - state.available.len();
        if in_use > 0 {
            warn!(in_use, "Closing fixed pool with connections still in use");
        }

        state.open = false;
        state.total = 0;
        let connections: Vec<_> = state.available.drain(..).collect();
        drop(state);

        connections.into_iter().for_each(PooledConnection::close);
    }

    fn counts(&self) -> ConnectionCounts {
        let state = self.state.lock();
        ConnectionCounts {
            total: state.total,
            idle: state.available.len(),
            created: state.created,
            evicted: 0,
        }
    }
}
