//! Error types for the index backend.

use dicom_index_sql::LookupError;
use thiserror::Error;

/// Errors that can occur while talking to the index database.
#[derive(Error, Debug)]
pub enum BackendError {
    /// A lookup could not be built or compiled.
    #[error("Invalid lookup: {0}")]
    Lookup(#[from] LookupError),

    /// An argument is outside the accepted range.
    #[error("Parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// An operation was called in the wrong state (closed connection,
    /// nested transaction, mixed answer kinds...).
    #[error("Bad sequence of calls: {0}")]
    BadSequenceOfCalls(String),

    /// An internal invariant was broken by the caller.
    #[error("Internal consistency violation: {0}")]
    Consistency(String),

    /// The store refused to serialize the transaction against concurrent
    /// ones. The transaction can be retried.
    #[error("Transaction cannot be serialized: {0}")]
    CannotSerialize(String),

    /// Any other failure reported by the store.
    #[error("Database error: {0}")]
    Database(String),

    /// No resource has the given identifier.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// The operation is not available for the active dialect or driver.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Error from the bundled SQLite driver.
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl BackendError {
    /// Whether re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::CannotSerialize(_))
    }

    /// Whether the error denotes a programming defect rather than a
    /// runtime failure.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            BackendError::Consistency(_) | BackendError::BadSequenceOfCalls(_)
        )
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
