//! Driver traits.
//!
//! A SQL engine plugs into the index through two traits:
//!
//! - [`DatabaseConnection`] is one live session: it executes driver-ready
//!   SQL with positional parameters and drives transactions.
//! - [`IndexBackend`] is a factory of connections for one database, plus
//!   the hooks run when the database is first opened and during
//!   housekeeping.
//!
//! Everything above these traits (statement caching, placeholder
//! rendering, transactions, index operations, lookups) is shared by all
//! drivers.
//!
//! # Example: Implementing IndexBackend
//!
//! ```ignore
//! use dicom_index_backend::{BackendConfig, BackendResult, DatabaseConnection, IndexBackend};
//! use dicom_index_sql::Dialect;
//!
//! struct PostgresBackend {
//!     url: String,
//!     config: BackendConfig,
//! }
//!
//! impl IndexBackend for PostgresBackend {
//!     fn dialect(&self) -> Dialect {
//!         Dialect::PostgreSQL
//!     }
//!
//!     fn config(&self) -> &BackendConfig {
//!         &self.config
//!     }
//!
//!     fn open_connection(&self) -> BackendResult<Box<dyn DatabaseConnection>> {
//!         Ok(Box::new(PostgresConnection::connect(&self.url)?))
//!     }
//!
//!     fn has_maintenance(&self) -> bool {
//!         true
//!     }
//!
//!     fn maintenance(&self, manager: &mut DatabaseManager) -> BackendResult<()> {
//!         manager.execute_batch("VACUUM ANALYZE")
//!     }
//! }
//! ```

use dicom_index_sql::{Dialect, Value};

use crate::config::BackendConfig;
use crate::error::BackendResult;
use crate::manager::DatabaseManager;
use crate::schema;

/// One row of a result set.
pub type Row = Vec<Value>;

/// Isolation requested when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Only `SELECT` statements are allowed.
    ReadOnly,
    /// Any statement is allowed.
    ReadWrite,
}

/// A live session with the store.
///
/// Connections are never shared between threads concurrently; the pool
/// hands each one to a single caller at a time.
pub trait DatabaseConnection: Send {
    /// Dialect of the SQL accepted by [`execute`](Self::execute).
    fn dialect(&self) -> Dialect;

    /// Executes one statement with positional parameters, returning every row.
    fn execute(&mut self, sql: &str, parameters: &[Value]) -> BackendResult<Vec<Row>>;

    /// Executes a batch of parameterless statements.
    fn execute_batch(&mut self, sql: &str) -> BackendResult<()>;

    /// Whether a table named `name` exists.
    fn does_table_exist(&mut self, name: &str) -> BackendResult<bool>;

    /// Identifier generated by the last `INSERT` into an auto-increment table.
    fn last_insert_id(&mut self) -> BackendResult<i64>;

    /// Begins a transaction.
    fn begin(&mut self, mode: TransactionMode) -> BackendResult<()>;

    /// Commits the current transaction.
    fn commit(&mut self) -> BackendResult<()>;

    /// Rolls back the current transaction.
    fn rollback(&mut self) -> BackendResult<()>;

    /// Releases the session. The default does nothing and lets `Drop` close it.
    fn close(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// A database the index can open connections to.
pub trait IndexBackend: Send + Sync {
    /// Dialect of the database.
    fn dialect(&self) -> Dialect;

    /// Backend configuration.
    fn config(&self) -> &BackendConfig;

    /// Opens a new session.
    fn open_connection(&self) -> BackendResult<Box<dyn DatabaseConnection>>;

    /// Prepares the database on the first connection of a pool.
    ///
    /// The default installs the index schema when it is missing.
    fn configure_database(&self, manager: &mut DatabaseManager) -> BackendResult<()> {
        schema::install(manager).map(|_| ())
    }

    /// Whether [`maintenance`](Self::maintenance) must run periodically.
    fn has_maintenance(&self) -> bool {
        false
    }

    /// Engine-specific periodic maintenance, run by the pool housekeeping
    /// thread on a borrowed connection.
    fn maintenance(&self, _manager: &mut DatabaseManager) -> BackendResult<()> {
        Ok(())
    }
}
