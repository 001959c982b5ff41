//! # dicom-index-pool
//!
//! Connection pools for the `dicom-index-backend` crate.
//!
//! Two pool variants share one lifecycle:
//!
//! - **Fixed**: a constant number of connections, all opened when the pool
//!   opens. A fixed pool refuses to close while connections are handed out.
//! - **Elastic**: connections are opened on demand up to a cap, reused
//!   most-recently-released first, and evicted by housekeeping once idle
//!   or old.
//!
//! While open, every pool runs one housekeeping thread. It wakes up at each
//! tick and, once the housekeeping delay has elapsed, runs the backend's
//! maintenance hook on a borrowed connection, then the pool's own
//! maintenance (eviction, connection gauge). Housekeeping failures are
//! logged and never stop the thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dicom_index_backend::{SqliteBackend, TransactionMode};
//! use dicom_index_pool::{ConnectionsPool, PoolConfig, PoolKind};
//! use dicom_index_sql::ResourceLevel;
//!
//! let config = PoolConfig::builder()
//!     .with_kind(PoolKind::Elastic)
//!     .with_max_connections_count(4)
//!     .build();
//!
//! let pool = ConnectionsPool::new(Arc::new(SqliteBackend::in_memory()), config)?;
//! pool.open()?;
//!
//! {
//!     let mut accessor = pool.accessor()?;
//!     let patients = accessor.transaction(TransactionMode::ReadOnly, |tx| {
//!         tx.get_resources_count(ResourceLevel::Patient)
//!     })?;
//!     assert_eq!(patients, 0);
//! }
//!
//! pool.close()?;
//! # Ok::<(), dicom_index_pool::PoolError>(())
//! ```
//!
//! ## Features
//!
//! - **`metrics`** (default): report the number of open connections as the
//!   `orthanc_index_active_connections_count` gauge after each housekeeping run

#![warn(missing_docs)]

mod config;
mod connection;
mod elastic;
mod error;
mod fixed;
mod pool;
mod semaphore;
mod strategy;

pub use config::{
    PoolConfig, PoolConfigBuilder, PoolKind, DEFAULT_ACQUIRE_RETRY, DEFAULT_CONNECTIONS_COUNT,
    DEFAULT_HOUSEKEEPING_DELAY, DEFAULT_HOUSEKEEPING_TICK, DEFAULT_MAX_CONNECTIONS_COUNT,
    DEFAULT_MAX_CONNECTION_AGE, DEFAULT_MAX_CONNECTION_IDLE, DEFAULT_MAX_CONNECTION_RETRIES,
};
pub use connection::{ConnectionFactory, PooledConnection};
pub use elastic::ElasticStrategy;
pub use error::{PoolError, PoolResult};
pub use fixed::FixedStrategy;
pub use pool::{Accessor, ConnectionsPool, ACTIVE_CONNECTIONS_GAUGE};
pub use semaphore::Semaphore;
pub use strategy::{ConnectionCounts, PoolStats, PoolStrategy};
