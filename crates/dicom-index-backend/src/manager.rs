//! Connection manager and transactions.
//!
//! A [`DatabaseManager`] owns one [`DatabaseConnection`] and everything
//! needed to run `${name}`-style statements on it: a statement cache and
//! placeholder rendering for the connection's dialect. Work happens inside
//! [`DatabaseManager::transaction`], which commits when the closure
//! succeeds and rolls back otherwise.

use dicom_index_sql::{Dialect, Dictionary, Query};
use tracing::{debug, error, warn};

use crate::cache::{CacheStats, StatementCache};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::traits::{DatabaseConnection, IndexBackend, Row, TransactionMode};

/// One connection to the index database.
///
/// # Example
///
/// ```ignore
/// let mut manager = DatabaseManager::open(&backend)?;
///
/// let count = manager.transaction(TransactionMode::ReadOnly, |tx| {
///     tx.get_resources_count(ResourceLevel::Study)
/// })?;
/// ```
pub struct DatabaseManager {
    connection: Option<Box<dyn DatabaseConnection>>,
    dialect: Dialect,
    statements: StatementCache,
    config: BackendConfig,
    in_transaction: bool,
}

impl DatabaseManager {
    /// Wraps an open connection.
    pub fn new(connection: Box<dyn DatabaseConnection>, config: &BackendConfig) -> Self {
        Self {
            dialect: connection.dialect(),
            connection: Some(connection),
            statements: StatementCache::new(config.statement_cache),
            config: config.clone(),
            in_transaction: false,
        }
    }

    /// Opens a new connection to `backend`.
    pub fn open(backend: &dyn IndexBackend) -> BackendResult<Self> {
        let connection = backend.open_connection()?;
        debug!(dialect = %backend.dialect(), "Opened index connection");
        Ok(Self::new(connection, backend.config()))
    }

    /// Dialect of the underlying connection.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Configuration the manager was opened with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Statement cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.statements.stats()
    }

    fn connection(&mut self) -> BackendResult<&mut (dyn DatabaseConnection + 'static)> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| BackendError::BadSequenceOfCalls("connection is closed".to_string()))
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. Serialization
    /// conflicts are logged at `warn` since the caller may retry them;
    /// other failures are logged at `error`. If `f` panics, the
    /// transaction is rolled back while unwinding and the manager stays
    /// usable.
    pub fn transaction<T, F>(&mut self, mode: TransactionMode, f: F) -> BackendResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> BackendResult<T>,
    {
        if self.in_transaction {
            return Err(BackendError::BadSequenceOfCalls(
                "nested transactions are not supported".to_string(),
            ));
        }

        self.connection()?.begin(mode)?;
        self.in_transaction = true;

        let mut transaction = Transaction {
            manager: &mut *self,
            mode,
        };
        let result = f(&mut transaction);
        transaction.finish(result)
    }

    fn rollback(&mut self) {
        match self.connection() {
            Ok(connection) => {
                if let Err(err) = connection.rollback() {
                    error!(error = %err, "Cannot roll back transaction");
                }
            }
            Err(err) => error!(error = %err, "Cannot roll back transaction"),
        }
    }

    /// Parses, renders and runs `sql` with named `parameters`.
    pub fn execute(&mut self, sql: &str, parameters: &Dictionary) -> BackendResult<Vec<Row>> {
        let query = self.statements.get_or_parse(sql)?;
        self.run(&query, parameters)
    }

    fn run(&mut self, query: &Query, parameters: &Dictionary) -> BackendResult<Vec<Row>> {
        let rendered = query.render(self.dialect);
        let values = rendered.bind(parameters)?;
        self.connection()?.execute(&rendered.sql, &values)
    }

    /// Runs parameterless DDL.
    pub fn execute_batch(&mut self, sql: &str) -> BackendResult<()> {
        self.connection()?.execute_batch(sql)
    }

    /// Whether a table named `name` exists.
    pub fn does_table_exist(&mut self, name: &str) -> BackendResult<bool> {
        self.connection()?.does_table_exist(name)
    }

    /// Identifier generated by the last `INSERT`.
    pub fn last_insert_id(&mut self) -> BackendResult<i64> {
        self.connection()?.last_insert_id()
    }

    /// Closes the connection. Further calls fail with
    /// [`BadSequenceOfCalls`](BackendError::BadSequenceOfCalls).
    pub fn close(&mut self) -> BackendResult<()> {
        match self.connection.take() {
            Some(mut connection) => {
                self.statements.clear();
                connection.close()
            }
            None => Err(BackendError::BadSequenceOfCalls(
                "connection is already closed".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("dialect", &self.dialect)
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction)
            .field("statements", &self.statements)
            .finish()
    }
}

fn log_failure(err: &BackendError) {
    if err.is_retryable() {
        warn!(error = %err, "Transaction cannot be serialized");
    } else {
        error!(error = %err, "Transaction failed");
    }
}

/// An open transaction.
///
/// Index operations are methods of this type; see the `index` module.
pub struct Transaction<'a> {
    manager: &'a mut DatabaseManager,
    mode: TransactionMode,
}

impl Transaction<'_> {
    /// Mode the transaction was opened with.
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Dialect of the connection.
    pub fn dialect(&self) -> Dialect {
        self.manager.dialect()
    }

    /// Runs `sql` with named `parameters`.
    ///
    /// Statements other than `SELECT` are rejected in a read-only
    /// transaction.
    pub fn execute(&mut self, sql: &str, parameters: &Dictionary) -> BackendResult<Vec<Row>> {
        let query = self.manager.statements.get_or_parse(sql)?;
        if self.mode == TransactionMode::ReadOnly && !query.is_read_only() {
            return Err(BackendError::BadSequenceOfCalls(format!(
                "write statement in a read-only transaction: {}",
                sql
            )));
        }
        self.manager.run(&query, parameters)
    }

    /// Identifier generated by the last `INSERT`.
    pub fn last_insert_id(&mut self) -> BackendResult<i64> {
        self.manager.last_insert_id()
    }
}

impl Transaction<'_> {
    /// Commits or rolls back according to `result`.
    fn finish<T>(mut self, result: BackendResult<T>) -> BackendResult<T> {
        self.manager.in_transaction = false;

        match result {
            Ok(value) => match self.manager.connection()?.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    log_failure(&err);
                    // The engine may keep the transaction open after a failed commit
                    self.manager.rollback();
                    Err(err)
                }
            },
            Err(err) => {
                log_failure(&err);
                self.manager.rollback();
                Err(err)
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // Only reached with the flag set when `f` unwound
        if self.manager.in_transaction {
            self.manager.in_transaction = false;
            warn!("Rolling back transaction interrupted by a panic");
            self.manager.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_index_sql::Value;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    /// Records every call made on the connection.
    #[derive(Default)]
    struct Journal {
        calls: Vec<String>,
        fail_commit: bool,
        fail_rollback: bool,
    }

    struct RecordingConnection {
        journal: Arc<Mutex<Journal>>,
    }

    impl DatabaseConnection for RecordingConnection {
        fn dialect(&self) -> Dialect {
            Dialect::PostgreSQL
        }

        fn execute(&mut self, sql: &str, parameters: &[Value]) -> BackendResult<Vec<Row>> {
            let mut journal = self.journal.lock().unwrap();
            journal.calls.push(format!("execute {} {:?}", sql, parameters));
            Ok(vec![vec![Value::Integer(1)]])
        }

        fn execute_batch(&mut self, sql: &str) -> BackendResult<()> {
            self.journal.lock().unwrap().calls.push(format!("batch {}", sql));
            Ok(())
        }

        fn does_table_exist(&mut self, _name: &str) -> BackendResult<bool> {
            Ok(true)
        }

        fn last_insert_id(&mut self) -> BackendResult<i64> {
            Ok(7)
        }

        fn begin(&mut self, mode: TransactionMode) -> BackendResult<()> {
            self.journal.lock().unwrap().calls.push(format!("begin {:?}", mode));
            Ok(())
        }

        fn commit(&mut self) -> BackendResult<()> {
            let mut journal = self.journal.lock().unwrap();
            journal.calls.push("commit".to_string());
            if journal.fail_commit {
                Err(BackendError::CannotSerialize("conflict".to_string()))
            } else {
                Ok(())
            }
        }

        fn rollback(&mut self) -> BackendResult<()> {
            let mut journal = self.journal.lock().unwrap();
            journal.calls.push("rollback".to_string());
            if journal.fail_rollback {
                Err(BackendError::Database("connection lost".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn manager() -> (DatabaseManager, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let connection = RecordingConnection {
            journal: Arc::clone(&journal),
        };
        (
            DatabaseManager::new(Box::new(connection), &BackendConfig::default()),
            journal,
        )
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let (mut manager, journal) = manager();

        let rows = manager
            .transaction(TransactionMode::ReadOnly, |tx| {
                tx.execute(
                    "SELECT publicId FROM Resources WHERE internalId=${id}",
                    &Dictionary::new().with("id", 5i64),
                )
            })
            .unwrap();

        assert_eq!(rows.len(), 1);
        let calls = journal.lock().unwrap().calls.clone();
        assert_eq!(
            calls,
            vec![
                "begin ReadOnly".to_string(),
                "execute SELECT publicId FROM Resources WHERE internalId=$1 [Integer(5)]".to_string(),
                "commit".to_string(),
            ]
        );
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (mut manager, journal) = manager();

        let result: BackendResult<()> = manager.transaction(TransactionMode::ReadWrite, |_| {
            Err(BackendError::Database("boom".to_string()))
        });

        assert!(matches!(result, Err(BackendError::Database(_))));
        let calls = journal.lock().unwrap().calls.clone();
        assert_eq!(calls.last().map(String::as_str), Some("rollback"));
        assert!(!calls.contains(&"commit".to_string()));
    }

    #[test]
    fn test_failed_commit_is_reported() {
        let (mut manager, journal) = manager();
        journal.lock().unwrap().fail_commit = true;

        let result = manager.transaction(TransactionMode::ReadWrite, |_| Ok(()));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(
            journal.lock().unwrap().calls.last().map(String::as_str),
            Some("rollback")
        );
    }

    #[test]
    #[traced_test]
    fn test_failed_rollback_after_failed_commit_is_logged() {
        let (mut manager, journal) = manager();
        {
            let mut journal = journal.lock().unwrap();
            journal.fail_commit = true;
            journal.fail_rollback = true;
        }

        let result = manager.transaction(TransactionMode::ReadWrite, |_| Ok(()));
        assert!(result.unwrap_err().is_retryable());
        assert!(logs_contain("Cannot roll back transaction"));
        assert!(logs_contain("connection lost"));
    }

    #[test]
    fn test_panic_in_transaction_rolls_back() {
        let (mut manager, journal) = manager();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: BackendResult<()> = manager.transaction(TransactionMode::ReadWrite, |tx| {
                tx.execute("DELETE FROM Labels", &Dictionary::new())?;
                panic!("worker crashed");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(
            journal.lock().unwrap().calls.last().map(String::as_str),
            Some("rollback")
        );

        // The manager accepts new transactions
        let rows = manager
            .transaction(TransactionMode::ReadOnly, |tx| {
                tx.execute("SELECT 1", &Dictionary::new())
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            journal.lock().unwrap().calls.last().map(String::as_str),
            Some("commit")
        );
    }

    #[test]
    fn test_read_only_transaction_rejects_writes() {
        let (mut manager, _) = manager();

        let result = manager.transaction(TransactionMode::ReadOnly, |tx| {
            tx.execute("DELETE FROM Resources", &Dictionary::new())
        });
        assert!(matches!(result, Err(BackendError::BadSequenceOfCalls(_))));
    }

    #[test]
    fn test_read_only_check_uses_cached_statement() {
        let (mut manager, _) = manager();

        manager
            .transaction(TransactionMode::ReadOnly, |tx| {
                tx.execute("  select count(*) FROM Labels", &Dictionary::new())?;
                tx.execute("  select count(*) FROM Labels", &Dictionary::new())
            })
            .unwrap();

        let stats = manager.cache_stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_missing_parameter_is_reported() {
        let (mut manager, _) = manager();

        let result = manager.execute("SELECT ${missing}", &Dictionary::new());
        assert!(matches!(result, Err(BackendError::Lookup(_))));
    }

    #[test]
    fn test_statements_are_cached() {
        let (mut manager, _) = manager();
        let params = Dictionary::new().with("id", 1i64);

        for _ in 0..3 {
            manager
                .execute("SELECT 1 WHERE 1=${id}", &params)
                .unwrap();
        }

        let stats = manager.cache_stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn test_closed_manager_rejects_calls() {
        let (mut manager, _) = manager();
        manager.close().unwrap();

        assert!(manager.is_closed());
        assert!(matches!(
            manager.execute("SELECT 1", &Dictionary::new()),
            Err(BackendError::BadSequenceOfCalls(_))
        ));
        assert!(matches!(
            manager.close(),
            Err(BackendError::BadSequenceOfCalls(_))
        ));
    }
}
