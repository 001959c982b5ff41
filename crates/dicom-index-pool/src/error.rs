//! Error types for the pool crate.

use dicom_index_backend::BackendError;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur while managing a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Error raised by the backend or one of its connections.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid pool configuration, detected at construction.
    #[error("Invalid pool configuration: {0}")]
    Configuration(String),

    /// Operation not valid in the current pool state.
    #[error("Bad sequence of calls: {0}")]
    BadSequenceOfCalls(String),

    /// Programming defect: a connection was leaked or misrouted.
    #[error("Internal consistency violation: {0}")]
    Consistency(String),

    /// The housekeeping thread could not be started.
    #[error("Cannot start housekeeping thread: {0}")]
    Thread(#[from] std::io::Error),

    /// A housekeeping hook failed.
    #[error("Housekeeping failed: {0}")]
    Housekeeping(String),
}

impl PoolError {
    /// Whether the error reveals a defect in the caller rather than a
    /// runtime failure.
    pub fn is_consistency_violation(&self) -> bool {
        match self {
            PoolError::Consistency(_) | PoolError::BadSequenceOfCalls(_) => true,
            PoolError::Backend(err) => err.is_consistency_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_is_transparent() {
        let err: PoolError = BackendError::CannotSerialize("conflict".to_string()).into();
        assert_eq!(err.to_string(), "Transaction cannot be serialized: conflict");
        assert!(!err.is_consistency_violation());
    }

    #[test]
    fn test_consistency_classification() {
        assert!(PoolError::Consistency("leak".to_string()).is_consistency_violation());
        assert!(PoolError::BadSequenceOfCalls("open twice".to_string()).is_consistency_violation());
        assert!(PoolError::from(BackendError::Consistency("x".to_string())).is_consistency_violation());
        assert!(!PoolError::Configuration("zero".to_string()).is_consistency_violation());
    }
}
