//! # dicom-index-sql
//!
//! SQL generation for a DICOM resource index.
//!
//! This crate provides:
//! - **Constraint model**: tag constraints over the Patient / Study / Series /
//!   Instance hierarchy, plus label filters
//! - **Lookup compiler**: turns constraints into a parameterized `SELECT`
//!   for PostgreSQL, MySQL, SQLite or SQL Server
//! - **Parameterized statements**: `${name}` placeholders rendered into each
//!   driver's positional syntax
//!
//! ## Lookup Usage
//!
//! ```rust
//! use dicom_index_sql::{Dialect, DicomTag, LookupBuilder, ResourceLevel};
//!
//! let lookup = LookupBuilder::new(ResourceLevel::Study)
//!     .equal(ResourceLevel::Study, DicomTag::ACCESSION_NUMBER, "ACC1")
//!     .build()
//!     .unwrap();
//!
//! let compiled = lookup.compile(Dialect::SQLite).unwrap();
//! assert!(compiled.sql.starts_with("SELECT publicId, internalId FROM Resources"));
//! assert_eq!(compiled.parameters.len(), 1);
//! ```
//!
//! ## Statement Usage
//!
//! ```rust
//! use dicom_index_sql::{Dialect, Query};
//!
//! let query = Query::parse("DELETE FROM Labels WHERE id=${id} AND label=${label}").unwrap();
//! assert_eq!(query.render(Dialect::MySQL).sql, "DELETE FROM Labels WHERE id=? AND label=?");
//! assert_eq!(query.render(Dialect::PostgreSQL).sql, "DELETE FROM Labels WHERE id=$1 AND label=$2");
//! ```
//!
//! ## Constraint Rendering Quick Reference
//!
//! | Constraint | Rendered predicate |
//! |------------|--------------------|
//! | Equal | `t0.value = ${p0}` |
//! | SmallerOrEqual | `t0.value <= ${p0}` |
//! | GreaterOrEqual | `t0.value >= ${p0}` |
//! | List | `t0.value IN (${p0}, ${p1})` |
//! | Wildcard | `t0.value LIKE ${p0} ESCAPE '\'` |
//! | case-insensitive | `lower(t0.value) = lower(${p0})` |
//! | optional | `(t0.value IS NULL OR ...)` with a `LEFT JOIN` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod builder;
mod compiler;
mod constraint;
mod dialect;
mod error;
mod formatter;
mod plan;
mod query;
mod value;

pub use builder::{Lookup, LookupBuilder, LookupRequest};
pub use compiler::{
    apply, apply_single_level, compile, compile_lookup, compile_single_level, escape_wildcard,
    CompiledLookup, Limits, DICOM_IDENTIFIERS_TABLE, MAIN_DICOM_TAGS_TABLE,
};
pub use constraint::{
    is_identifier_tag, normalize_identifier, ConstraintType, DatabaseConstraint,
    DatabaseConstraints, DicomTag, LabelFilter, LabelsConstraint, ResourceLevel, TagConstraint,
    IDENTIFIER_TAGS,
};
pub use dialect::Dialect;
pub use error::{LookupError, LookupResult};
pub use formatter::{DialectFormatter, LookupFormatter};
pub use plan::{explain, LookupPlan, LookupStrategy, PlanStep};
pub use query::{Query, RenderedQuery, Token};
pub use value::{Dictionary, Value};
