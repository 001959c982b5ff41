//! Bundled SQLite driver.
//!
//! Serialization conflicts (`SQLITE_BUSY`, `SQLITE_LOCKED`) surface as
//! [`BackendError::CannotSerialize`] so that callers retry them. Write
//! transactions begin with `BEGIN IMMEDIATE`, which takes the write lock
//! up front and makes such conflicts appear at the start of the
//! transaction rather than at commit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dicom_index_sql::{Dialect, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::manager::DatabaseManager;
use crate::traits::{DatabaseConnection, IndexBackend, Row, TransactionMode};

/// Default time a connection waits on a lock before reporting a conflict.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// SQLite database backing the index.
///
/// # Example
///
/// ```rust,no_run
/// use dicom_index_backend::{DatabaseManager, SqliteBackend};
///
/// let backend = SqliteBackend::open("/var/lib/index/index.db");
/// let mut manager = DatabaseManager::open(&backend)?;
/// # Ok::<(), dicom_index_backend::BackendError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: Option<PathBuf>,
    busy_timeout: Duration,
    optimize: bool,
    config: BackendConfig,
}

impl SqliteBackend {
    /// A database stored at `path`, created if needed.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            optimize: false,
            config: BackendConfig::default(),
        }
    }

    /// A private in-memory database.
    ///
    /// Every connection opened on it sees its own empty database, so it is
    /// only useful with a single connection.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            optimize: false,
            config: BackendConfig::default(),
        }
    }

    /// Sets the backend configuration.
    pub fn with_config(mut self, config: BackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long a connection waits on a lock.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Runs `PRAGMA optimize` during housekeeping.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Path of the database file, `None` in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connect(&self) -> BackendResult<Connection> {
        let connection = match &self.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(map_error)?;

        connection
            .busy_timeout(self.busy_timeout)
            .map_err(map_error)?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_error)?;
        // Wildcard lookups are case-sensitive unless asked otherwise
        connection
            .execute_batch("PRAGMA case_sensitive_like = ON;")
            .map_err(map_error)?;
        if self.path.is_some() {
            connection
                .execute_batch("PRAGMA journal_mode = WAL;")
                .map_err(map_error)?;
        }

        Ok(connection)
    }
}

impl IndexBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn open_connection(&self) -> BackendResult<Box<dyn DatabaseConnection>> {
        let connection = self.connect()?;
        debug!(path = ?self.path, "Opened SQLite connection");
        Ok(Box::new(SqliteConnection { connection }))
    }

    fn has_maintenance(&self) -> bool {
        self.optimize
    }

    fn maintenance(&self, manager: &mut DatabaseManager) -> BackendResult<()> {
        manager.execute_batch("PRAGMA optimize;")
    }
}

/// One SQLite session.
pub struct SqliteConnection {
    connection: Connection,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.connection.path())
            .finish()
    }
}

/// Maps lock contention to [`BackendError::CannotSerialize`].
fn map_error(err: rusqlite::Error) -> BackendError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            BackendError::CannotSerialize(err.to_string())
        }
        _ => BackendError::Sqlite(err),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(value) => SqlValue::Integer(*value),
        Value::Utf8(text) => SqlValue::Text(text.clone()),
        Value::Binary(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> BackendResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Integer(value),
        ValueRef::Real(value) => Value::Utf8(value.to_string()),
        ValueRef::Text(bytes) => Value::Utf8(
            String::from_utf8(bytes.to_vec())
                .map_err(|_| BackendError::Database("text column is not UTF-8".to_string()))?,
        ),
        ValueRef::Blob(bytes) => Value::Binary(bytes.to_vec()),
    })
}

impl DatabaseConnection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    fn execute(&mut self, sql: &str, parameters: &[Value]) -> BackendResult<Vec<Row>> {
        let mut statement = self.connection.prepare_cached(sql).map_err(map_error)?;
        let values = parameters.iter().map(to_sql);

        let columns = statement.column_count();
        if columns == 0 {
            statement.execute(params_from_iter(values)).map_err(map_error)?;
            return Ok(Vec::new());
        }

        let mut rows = statement.query(params_from_iter(values)).map_err(map_error)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(columns);
            for index in 0..columns {
                values.push(from_sql(row.get_ref(index).map_err(map_error)?)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    fn execute_batch(&mut self, sql: &str) -> BackendResult<()> {
        self.connection.execute_batch(sql).map_err(map_error)
    }

    fn does_table_exist(&mut self, name: &str) -> BackendResult<bool> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(map_error)?;
        Ok(count > 0)
    }

    fn last_insert_id(&mut self) -> BackendResult<i64> {
        Ok(self.connection.last_insert_rowid())
    }

    fn begin(&mut self, mode: TransactionMode) -> BackendResult<()> {
        let sql = match mode {
            TransactionMode::ReadOnly => "BEGIN DEFERRED",
            TransactionMode::ReadWrite => "BEGIN IMMEDIATE",
        };
        self.connection.execute_batch(sql).map_err(map_error)
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.connection.execute_batch("COMMIT").map_err(map_error)
    }

    fn rollback(&mut self) -> BackendResult<()> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection.execute_batch("ROLLBACK").map_err(map_error)
    }
}
