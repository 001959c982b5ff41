//! Connections handed out by a pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dicom_index_backend::{DatabaseManager, IndexBackend};
use tracing::{debug, warn};

use crate::error::PoolResult;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A database connection owned by a pool.
///
/// Each connection remembers the pool that created it, so that releasing
/// it into another pool can be detected.
#[derive(Debug)]
pub struct PooledConnection {
    id: u64,
    pool_id: u64,
    manager: DatabaseManager,
    created: Instant,
    last_used: Instant,
}

impl PooledConnection {
    /// Unique identifier of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifier of the pool that created this connection.
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// The underlying manager.
    pub fn manager(&mut self) -> &mut DatabaseManager {
        &mut self.manager
    }

    /// Time since the connection was opened.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Time since the connection was last released.
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Marks the connection as just released.
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Closes the underlying connection, logging failures.
    pub fn close(mut self) {
        match self.manager.close() {
            Ok(()) => debug!(connection = self.id, pool = self.pool_id, "Closed connection"),
            Err(err) => warn!(connection = self.id, error = %err, "Cannot close connection"),
        }
    }
}

/// Opens connections on behalf of one pool.
pub struct ConnectionFactory<'a> {
    backend: &'a dyn IndexBackend,
    pool_id: u64,
}

impl<'a> ConnectionFactory<'a> {
    /// Creates a factory opening connections to `backend` for pool `pool_id`.
    pub fn new(backend: &'a dyn IndexBackend, pool_id: u64) -> Self {
        Self { backend, pool_id }
    }

    /// The backend connections are opened to.
    pub fn backend(&self) -> &'a dyn IndexBackend {
        self.backend
    }

    /// Opens a new connection.
    pub fn open(&self) -> PoolResult<PooledConnection> {
        let manager = DatabaseManager::open(self.backend)?;
        let now = Instant::now();
        let connection = PooledConnection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            pool_id: self.pool_id,
            manager,
            created: now,
            last_used: now,
        };
        debug!(connection = connection.id, pool = self.pool_id, "Opened connection");
        Ok(connection)
    }

    /// Prepares the database through `connection`.
    pub fn configure(&self, connection: &mut PooledConnection) -> PoolResult<()> {
        self.backend.configure_database(connection.manager())?;
        Ok(())
    }
}
