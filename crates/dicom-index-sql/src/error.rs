//! Error types for lookup construction and SQL generation.

use thiserror::Error;

/// Errors that can occur while building constraints or compiling SQL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// A constraint violates its construction invariant.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// A value is outside the range accepted by the operation.
    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// The single-level fast path was requested for a multi-level lookup.
    #[error("constraint at level {constraint} cannot be compiled by a single-level lookup at level {query}")]
    NotSingleLevel {
        /// Level of the offending constraint.
        constraint: String,
        /// Requested query level.
        query: String,
    },

    /// Parse error in a parameterized SQL statement.
    #[error("parse error at position {position}: {message}")]
    ParseError {
        /// Byte position in the SQL text where the error occurred.
        position: usize,
        /// Description of the error.
        message: String,
    },

    /// A statement references a parameter absent from the dictionary.
    #[error("inexistent parameter: {0}")]
    InexistentItem(String),

    /// Unknown dialect name.
    #[error("unknown SQL dialect: {0}")]
    UnknownDialect(String),
}

/// Result type for lookup operations.
pub type LookupResult<T> = std::result::Result<T, LookupError>;
