//! # dicom-index-backend
//!
//! Transactional index of DICOM resources over pluggable SQL drivers.
//!
//! The index stores the Patient / Study / Series / Instance hierarchy with
//! its tags, metadata, attachments, labels, change log and export log, and
//! answers lookups compiled by [`dicom_index_sql`].
//!
//! ## Key Features
//!
//! - **Driver-agnostic** - implement [`DatabaseConnection`] and
//!   [`IndexBackend`] for any SQL engine; statements are written once with
//!   `${name}` placeholders and rendered for each dialect
//! - **Statement cache** - parsed statements are kept per connection in an
//!   LRU cache
//! - **Typed answers** - operations write rows to an [`Output`] that
//!   refuses to mix answer kinds within one execution
//! - **Retry** - serialization conflicts are classified and retried with
//!   linear backoff
//! - **Bundled SQLite** - the `sqlite` feature (default) ships a driver on
//!   top of `rusqlite`
//!
//! ## Quick Start
//!
//! ```rust
//! use dicom_index_backend::{DatabaseManager, IndexBackend, Output, SqliteBackend, TransactionMode};
//! use dicom_index_sql::{DicomTag, LookupBuilder, ResourceLevel};
//!
//! let backend = SqliteBackend::in_memory();
//! let mut manager = DatabaseManager::open(&backend)?;
//! backend.configure_database(&mut manager)?;
//!
//! manager.transaction(TransactionMode::ReadWrite, |tx| {
//!     let patient = tx.create_resource("p1", ResourceLevel::Patient)?;
//!     tx.set_identifier_tag(patient, DicomTag::PATIENT_ID, "P-001")
//! })?;
//!
//! let lookup = LookupBuilder::new(ResourceLevel::Patient)
//!     .equal(ResourceLevel::Patient, DicomTag::PATIENT_ID, "P-001")
//!     .build()?;
//!
//! let mut output = Output::new();
//! manager.transaction(TransactionMode::ReadOnly, |tx| {
//!     tx.run_lookup(&mut output, &lookup, false)
//! })?;
//! assert_eq!(output.matching_public_ids(), vec!["p1"]);
//! # Ok::<(), dicom_index_backend::BackendError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` (default) - bundled SQLite driver
//! - `serde` - serde support for the lookup types

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod index;
mod manager;
mod output;
mod retry;
pub mod schema;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use cache::{CacheStats, StatementCache};
pub use config::{
    BackendConfig, BackendConfigBuilder, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF,
    DEFAULT_STATEMENT_CACHE,
};
pub use error::{BackendError, BackendResult};
pub use index::DATE_FORMAT;
pub use manager::{DatabaseManager, Transaction};
pub use output::{Answer, AnswerKind, Attachment, Change, ExportedResource, Output};
pub use retry::{backoff_delay, with_retries};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConnection, DEFAULT_BUSY_TIMEOUT};
pub use traits::{DatabaseConnection, IndexBackend, Row, TransactionMode};
