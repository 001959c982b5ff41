//! Pool strategies.
//!
//! [`ConnectionsPool`](crate::ConnectionsPool) owns the lifecycle shared
//! by every pool (open/close states, housekeeping thread, accessor); a
//! [`PoolStrategy`] decides how connections are created, handed out and
//! retired.

use std::fmt;
use std::time::Duration;

use crate::config::PoolKind;
use crate::connection::{ConnectionFactory, PooledConnection};
use crate::error::PoolResult;

/// Connection counters reported by a strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionCounts {
    /// Connections currently open, idle or in use.
    pub total: usize,
    /// Connections waiting to be handed out.
    pub idle: usize,
    /// Connections opened since the pool was created.
    pub created: u64,
    /// Connections closed by idle eviction.
    pub evicted: u64,
}

/// Snapshot of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Pool variant.
    pub kind: PoolKind,
    /// Whether the pool is open.
    pub open: bool,
    /// Connections currently open.
    pub total: usize,
    /// Connections waiting to be handed out.
    pub idle: usize,
    /// Connections handed out.
    pub in_use: usize,
    /// Connections opened since the pool was created.
    pub created: u64,
    /// Connections closed by idle eviction.
    pub evicted: u64,
}

impl PoolStats {
    pub(crate) fn new(kind: PoolKind, open: bool, counts: ConnectionCounts) -> Self {
        Self {
            kind,
            open,
            total: counts.total,
            idle: counts.idle,
            in_use: counts.total.saturating_sub(counts.idle),
            created: counts.created,
            evicted: counts.evicted,
        }
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pool ({}): {} connections, {} idle, {} in use, {} created, {} evicted",
            self.kind,
            if self.open { "open" } else { "closed" },
            self.total,
            self.idle,
            self.in_use,
            self.created,
            self.evicted
        )
    }
}

/// How a pool manages its connections.
///
/// The pool calls [`open`](Self::open) and [`close`](Self::close) exactly
/// once per open/close cycle and never calls [`acquire`](Self::acquire)
/// while closed.
pub trait PoolStrategy: Send + Sync {
    /// Pool variant implemented by this strategy.
    fn kind(&self) -> PoolKind;

    /// Opens the initial connections and prepares the database on the
    /// first one.
    fn open(&self, factory: &ConnectionFactory<'_>) -> PoolResult<()>;

    /// Hands out a connection, waiting at most `timeout`.
    ///
    /// `Ok(None)` means none was available in time; the pool retries.
    fn acquire(
        &self,
        factory: &ConnectionFactory<'_>,
        timeout: Duration,
    ) -> PoolResult<Option<PooledConnection>>;

    /// Takes back a connection previously handed out by this strategy.
    fn release(&self, connection: PooledConnection);

    /// Closes a connection whose state is unknown, typically after a
    /// panic while it was borrowed, instead of taking it back.
    ///
    /// The strategy's accounting must stay consistent: a fixed pool
    /// replaces the connection, an elastic pool gives its capacity back.
    fn discard(&self, factory: &ConnectionFactory<'_>, connection: PooledConnection);

    /// Closes every connection, failing if the strategy cannot account
    /// for all of them.
    fn close(&self) -> PoolResult<()>;

    /// Closes every idle connection unconditionally.
    fn force_close(&self);

    /// Periodic pool-specific work, run by the housekeeping thread.
    fn housekeeping(&self) {}

    /// Current connection counters.
    fn counts(&self) -> ConnectionCounts;
}
