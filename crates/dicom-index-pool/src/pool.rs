//! Pool lifecycle, housekeeping and accessor.
//!
//! A [`ConnectionsPool`] is either closed or open. Opening it opens the
//! strategy's connections and starts one housekeeping thread; closing it
//! stops the thread before closing the connections. Dropping an open pool
//! closes it unconditionally.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dicom_index_backend::{SqliteBackend, TransactionMode};
//! use dicom_index_pool::{ConnectionsPool, PoolConfig};
//! use dicom_index_sql::ResourceLevel;
//!
//! let backend = Arc::new(SqliteBackend::open("/var/lib/index/index.db"));
//! let pool = ConnectionsPool::new(backend, PoolConfig::default())?;
//! pool.open()?;
//!
//! let mut accessor = pool.accessor()?;
//! let studies = accessor.transaction(TransactionMode::ReadOnly, |tx| {
//!     tx.get_resources_count(ResourceLevel::Study)
//! })?;
//! drop(accessor);
//!
//! pool.close()?;
//! # Ok::<(), dicom_index_pool::PoolError>(())
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dicom_index_backend::{BackendResult, DatabaseManager, IndexBackend, Transaction, TransactionMode};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{PoolConfig, PoolKind};
use crate::connection::{ConnectionFactory, PooledConnection};
use crate::elastic::ElasticStrategy;
use crate::error::{PoolError, PoolResult};
use crate::fixed::FixedStrategy;
use crate::strategy::{PoolStats, PoolStrategy};

/// Name of the gauge reporting the number of open connections.
pub const ACTIVE_CONNECTIONS_GAUGE: &str = "orthanc_index_active_connections_count";

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Shared state
// =============================================================================

struct PoolInner {
    id: u64,
    backend: Arc<dyn IndexBackend>,
    strategy: Box<dyn PoolStrategy>,
    open: Mutex<bool>,
    housekeeping_delay: Duration,
    housekeeping_tick: Duration,
    acquire_retry: Duration,
}

impl PoolInner {
    fn factory(&self) -> ConnectionFactory<'_> {
        ConnectionFactory::new(self.backend.as_ref(), self.id)
    }

    fn try_acquire(&self, timeout: Duration) -> PoolResult<Option<PooledConnection>> {
        if !*self.open.lock() {
            return Err(PoolError::BadSequenceOfCalls(
                "the pool is not open".to_string(),
            ));
        }
        self.strategy.acquire(&self.factory(), timeout)
    }

    /// Closes a connection from another pool and reports it.
    fn check_owner(&self, connection: PooledConnection) -> PoolResult<PooledConnection> {
        if connection.pool_id() == self.id {
            return Ok(connection);
        }

        let message = format!(
            "connection {} belongs to pool {}, not to pool {}",
            connection.id(),
            connection.pool_id(),
            self.id
        );
        // Hand it back to nobody rather than corrupt this pool's counts
        connection.close();
        Err(PoolError::Consistency(message))
    }

    fn release(&self, connection: PooledConnection) -> PoolResult<()> {
        let connection = self.check_owner(connection)?;
        self.strategy.release(connection);
        Ok(())
    }

    fn discard(&self, connection: PooledConnection) -> PoolResult<()> {
        let connection = self.check_owner(connection)?;
        warn!(pool = self.id, connection = connection.id(), "Discarding connection after a panic");
        self.strategy.discard(&self.factory(), connection);
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        PoolStats::new(self.strategy.kind(), *self.open.lock(), self.strategy.counts())
    }

    /// Runs the backend hook under one borrowed connection.
    fn backend_maintenance(&self) -> PoolResult<()> {
        let Some(mut connection) = self.try_acquire(self.acquire_retry)? else {
            debug!(pool = self.id, "No idle connection for maintenance, skipping");
            return Ok(());
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.backend.maintenance(connection.manager())
        }));

        match outcome {
            Ok(result) => {
                self.release(connection)?;
                Ok(result?)
            }
            Err(panic) => {
                self.discard(connection)?;
                Err(PoolError::Housekeeping(panic_message(panic.as_ref())))
            }
        }
    }

    fn pool_maintenance(&self) -> PoolResult<()> {
        catch_unwind(AssertUnwindSafe(|| self.strategy.housekeeping()))
            .map_err(|panic| PoolError::Housekeeping(panic_message(panic.as_ref())))?;

        #[cfg(feature = "metrics")]
        metrics::gauge!(ACTIVE_CONNECTIONS_GAUGE).set(self.strategy.counts().total as f64);

        Ok(())
    }

    fn run_housekeeping(&self) {
        if self.backend.has_maintenance() {
            if let Err(err) = self.backend_maintenance() {
                error!(pool = self.id, error = %err, "Backend maintenance failed");
            }
        }

        if let Err(err) = self.pool_maintenance() {
            error!(pool = self.id, error = %err, "Pool maintenance failed");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic".to_string()
    }
}

// =============================================================================
// Housekeeping thread
// =============================================================================

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Waits up to `timeout`; returns true once stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.condvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }
}

struct Housekeeping {
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

impl Housekeeping {
    fn start(inner: Arc<PoolInner>) -> PoolResult<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name(format!("index-housekeeping-{}", inner.id))
            .spawn(move || {
                let mut last_run = Instant::now();
                while !thread_signal.wait(inner.housekeeping_tick) {
                    if last_run.elapsed() >= inner.housekeeping_delay {
                        inner.run_housekeeping();
                        last_run = Instant::now();
                    }
                }
            })?;

        Ok(Self { signal, handle })
    }

    fn stop(self) {
        self.signal.stop();
        if self.handle.join().is_err() {
            error!("Housekeeping thread panicked");
        }
    }
}

// =============================================================================
// Pool
// =============================================================================

/// A pool of index connections.
///
/// Safe to share between threads; wrap it in an `Arc` to hand it to
/// worker threads.
pub struct ConnectionsPool {
    inner: Arc<PoolInner>,
    housekeeping: Mutex<Option<Housekeeping>>,
}

impl ConnectionsPool {
    /// Creates a closed pool of the kind selected by `config`.
    pub fn new(backend: Arc<dyn IndexBackend>, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let strategy: Box<dyn PoolStrategy> = match config.kind {
            PoolKind::Fixed => Box::new(FixedStrategy::new(config.connections_count)?),
            PoolKind::Elastic => Box::new(
                ElasticStrategy::new(config.max_connections_count)?
                    .with_eviction(config.max_connection_age, config.max_connection_idle),
            ),
        };

        Self::with_strategy(backend, strategy, config)
    }

    /// Creates a closed fixed pool of `count` connections.
    pub fn fixed(backend: Arc<dyn IndexBackend>, count: usize) -> PoolResult<Self> {
        let config = PoolConfig::builder()
            .with_kind(PoolKind::Fixed)
            .with_connections_count(count)
            .build();
        Self::new(backend, config)
    }

    /// Creates a closed elastic pool of at most `max_count` connections.
    pub fn elastic(backend: Arc<dyn IndexBackend>, max_count: usize) -> PoolResult<Self> {
        let config = PoolConfig::builder()
            .with_kind(PoolKind::Elastic)
            .with_max_connections_count(max_count)
            .build();
        Self::new(backend, config)
    }

    /// Creates a closed pool around a custom strategy.
    ///
    /// Only the housekeeping and acquire settings of `config` are used.
    pub fn with_strategy(
        backend: Arc<dyn IndexBackend>,
        strategy: Box<dyn PoolStrategy>,
        config: PoolConfig,
    ) -> PoolResult<Self> {
        if backend.has_maintenance() && config.housekeeping_delay.is_zero() {
            return Err(PoolError::Configuration(
                "the backend needs maintenance but the housekeeping delay is zero".to_string(),
            ));
        }

        let inner = PoolInner {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            strategy,
            open: Mutex::new(false),
            housekeeping_delay: config.housekeeping_delay,
            housekeeping_tick: config.housekeeping_tick,
            acquire_retry: config.acquire_retry,
        };

        Ok(Self {
            inner: Arc::new(inner),
            housekeeping: Mutex::new(None),
        })
    }

    /// Identifier stamped on every connection of this pool.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The backend connections are opened to.
    pub fn backend(&self) -> &dyn IndexBackend {
        self.inner.backend.as_ref()
    }

    /// Whether the pool is open.
    pub fn is_open(&self) -> bool {
        *self.inner.open.lock()
    }

    /// Opens the connections and starts housekeeping.
    ///
    /// Fails with [`PoolError::BadSequenceOfCalls`] if already open.
    pub fn open(&self) -> PoolResult<()> {
        let mut open = self.inner.open.lock();
        if *open {
            return Err(PoolError::BadSequenceOfCalls(
                "the pool is already open".to_string(),
            ));
        }

        self.inner.strategy.open(&self.inner.factory())?;
        *open = true;
        drop(open);

        self.start_housekeeping()?;
        info!(pool = self.inner.id, kind = %self.inner.strategy.kind(), "Pool is open");
        Ok(())
    }

    /// Stops housekeeping and closes the connections.
    ///
    /// A fixed pool refuses to close while connections are handed out:
    /// the error is a [`PoolError::Consistency`] and the pool stays open
    /// with its idle connections untouched.
    pub fn close(&self) -> PoolResult<()> {
        if !self.is_open() {
            return Err(PoolError::BadSequenceOfCalls(
                "the pool is not open".to_string(),
            ));
        }

        self.stop_housekeeping();

        if let Err(err) = self.inner.strategy.close() {
            error!(pool = self.inner.id, error = %err, "Cannot close pool");
            self.start_housekeeping()?;
            return Err(err);
        }

        *self.inner.open.lock() = false;
        info!(pool = self.inner.id, "Pool is closed");
        Ok(())
    }

    fn start_housekeeping(&self) -> PoolResult<()> {
        let mut housekeeping = self.housekeeping.lock();
        if housekeeping.is_none() {
            *housekeeping = Some(Housekeeping::start(Arc::clone(&self.inner))?);
        }
        Ok(())
    }

    fn stop_housekeeping(&self) {
        let housekeeping = self.housekeeping.lock().take();
        if let Some(housekeeping) = housekeeping {
            housekeeping.stop();
        }
    }

    /// Takes a connection, waiting as long as needed.
    pub fn acquire(&self) -> PoolResult<PooledConnection> {
        loop {
            if let Some(connection) = self.inner.try_acquire(self.inner.acquire_retry)? {
                return Ok(connection);
            }
        }
    }

    /// Takes a connection if one becomes available within `timeout`.
    pub fn try_acquire(&self, timeout: Duration) -> PoolResult<Option<PooledConnection>> {
        self.inner.try_acquire(timeout)
    }

    /// Gives back a connection taken from this pool.
    ///
    /// A connection from another pool is closed and reported as a
    /// [`PoolError::Consistency`] error.
    pub fn release(&self, connection: PooledConnection) -> PoolResult<()> {
        self.inner.release(connection)
    }

    /// Takes a connection that returns to the pool when dropped.
    pub fn accessor(&self) -> PoolResult<Accessor<'_>> {
        Ok(Accessor {
            pool: self,
            connection: Some(self.acquire()?),
        })
    }

    /// Runs one housekeeping pass now.
    pub fn run_housekeeping(&self) {
        self.inner.run_housekeeping();
    }

    /// Snapshot of the pool.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

impl Drop for ConnectionsPool {
    fn drop(&mut self) {
        self.stop_housekeeping();
        let mut open = self.inner.open.lock();
        if *open {
            self.inner.strategy.force_close();
            *open = false;
        }
    }
}

impl std::fmt::Debug for ConnectionsPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionsPool")
            .field("id", &self.inner.id)
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Accessor
// =============================================================================

/// A connection borrowed from a pool, returned when dropped.
pub struct Accessor<'a> {
    pool: &'a ConnectionsPool,
    connection: Option<PooledConnection>,
}

impl Accessor<'_> {
    fn connection(&mut self) -> &mut PooledConnection {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("the connection is only taken when the accessor drops"),
        }
    }

    /// Identifier of the borrowed connection.
    pub fn connection_id(&self) -> u64 {
        self.connection.as_ref().map_or(0, PooledConnection::id)
    }

    /// The borrowed connection's manager.
    pub fn manager(&mut self) -> &mut DatabaseManager {
        self.connection().manager()
    }

    /// The backend of the pool.
    pub fn backend(&self) -> &dyn IndexBackend {
        self.pool.backend()
    }

    /// Runs `f` in a transaction, retried on serialization conflicts.
    pub fn transaction<T, F>(&mut self, mode: TransactionMode, f: F) -> BackendResult<T>
    where
        F: FnMut(&mut Transaction<'_>) -> BackendResult<T>,
    {
        self.manager().transaction_with_retries(mode, f)
    }
}

impl Drop for Accessor<'_> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let result = if thread::panicking() {
            self.pool.inner.discard(connection)
        } else {
            self.pool.release(connection)
        };
        if let Err(err) = result {
            error!(error = %err, "Cannot release connection");
        }
    }
}
