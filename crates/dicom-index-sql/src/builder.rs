//! Lookup construction.
//!
//! Hosts describe a lookup either as a [`LookupRequest`] (a plain data
//! structure that can be deserialized from JSON with the `serde` feature)
//! or through the [`LookupBuilder`] fluent API. Both classify each tag into
//! the identifier or main-tag table and produce a [`Lookup`] ready to be
//! compiled.

use crate::compiler::{compile_lookup, CompiledLookup, Limits};
use crate::constraint::{
    ConstraintType, DatabaseConstraints, DicomTag, LabelFilter, LabelsConstraint, ResourceLevel,
    TagConstraint,
};
use crate::dialect::Dialect;
use crate::error::{LookupError, LookupResult};
use crate::plan::LookupPlan;

/// A fully classified lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Level of the returned resources.
    pub level: ResourceLevel,
    /// Constraints, in order.
    pub constraints: DatabaseConstraints,
    /// Label filter.
    pub labels: LabelFilter,
    /// Pagination.
    pub limits: Limits,
}

impl Lookup {
    /// Compiles with the cheapest applicable strategy for `dialect`.
    pub fn compile(&self, dialect: Dialect) -> LookupResult<CompiledLookup> {
        compile_lookup(dialect, &self.constraints, self.level, &self.labels, self.limits)
    }

    /// Plans the lookup without generating SQL.
    pub fn explain(&self) -> LookupPlan {
        LookupPlan::new(&self.constraints, self.level, &self.labels)
    }
}

/// Request to run a lookup.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LookupRequest {
    /// Level of the returned resources.
    pub level: ResourceLevel,

    /// Tag constraints.
    #[cfg_attr(feature = "serde", serde(default))]
    pub constraints: Vec<TagConstraint>,

    /// Labels to filter on.
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: Vec<String>,

    /// How `labels` filters.
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels_constraint: LabelsConstraint,

    /// Rows to skip.
    #[cfg_attr(feature = "serde", serde(default))]
    pub since: u64,

    /// Maximum number of rows (0 = unlimited).
    #[cfg_attr(feature = "serde", serde(default))]
    pub limit: u64,
}

impl LookupRequest {
    /// Classifies every constraint and builds the lookup.
    pub fn into_lookup(self) -> LookupResult<Lookup> {
        let constraints = self
            .constraints
            .into_iter()
            .map(TagConstraint::into_database_constraint)
            .collect::<LookupResult<DatabaseConstraints>>()?;

        Ok(Lookup {
            level: self.level,
            constraints,
            labels: LabelFilter::new(self.labels, self.labels_constraint),
            limits: Limits::paged(self.since, self.limit),
        })
    }
}

// =============================================================================
// Fluent Builder API
// =============================================================================

/// Fluent builder for lookups.
///
/// Constraints default to mandatory and case-sensitive; [`optional`] and
/// [`case_insensitive`] modify the most recently added constraint.
///
/// [`optional`]: LookupBuilder::optional
/// [`case_insensitive`]: LookupBuilder::case_insensitive
///
/// # Example
///
/// ```rust
/// use dicom_index_sql::{Dialect, DicomTag, LabelsConstraint, LookupBuilder, ResourceLevel};
///
/// let lookup = LookupBuilder::new(ResourceLevel::Study)
///     .equal(ResourceLevel::Patient, DicomTag::PATIENT_ID, "P1")
///     .wildcard(ResourceLevel::Study, DicomTag::STUDY_DESCRIPTION, "CHEST*")
///     .case_insensitive()
///     .labels(["reviewed"], LabelsConstraint::All)
///     .limit(100)
///     .build()
///     .unwrap();
///
/// let compiled = lookup.compile(Dialect::PostgreSQL).unwrap();
/// assert!(compiled.sql.ends_with(" LIMIT 100"));
/// ```
#[derive(Debug, Clone)]
pub struct LookupBuilder {
    level: ResourceLevel,
    constraints: Vec<TagConstraint>,
    labels: Vec<String>,
    labels_constraint: LabelsConstraint,
    limits: Limits,
    misuse: Option<String>,
}

impl LookupBuilder {
    /// Starts a lookup returning resources at `level`.
    pub fn new(level: ResourceLevel) -> Self {
        Self {
            level,
            constraints: Vec::new(),
            labels: Vec::new(),
            labels_constraint: LabelsConstraint::default(),
            limits: Limits::none(),
            misuse: None,
        }
    }

    /// Adds a constraint as-is.
    pub fn constraint(mut self, constraint: TagConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    fn push(
        self,
        level: ResourceLevel,
        tag: DicomTag,
        constraint_type: ConstraintType,
        values: Vec<String>,
    ) -> Self {
        self.constraint(TagConstraint {
            level,
            tag,
            constraint_type,
            values,
            case_sensitive: true,
            mandatory: true,
        })
    }

    /// `tag = value`.
    pub fn equal(self, level: ResourceLevel, tag: DicomTag, value: impl Into<String>) -> Self {
        self.push(level, tag, ConstraintType::Equal, vec![value.into()])
    }

    /// `tag <= value`.
    pub fn smaller_or_equal(self, level: ResourceLevel, tag: DicomTag, value: impl Into<String>) -> Self {
        self.push(level, tag, ConstraintType::SmallerOrEqual, vec![value.into()])
    }

    /// `tag >= value`.
    pub fn greater_or_equal(self, level: ResourceLevel, tag: DicomTag, value: impl Into<String>) -> Self {
        self.push(level, tag, ConstraintType::GreaterOrEqual, vec![value.into()])
    }

    /// `lower <= tag <= upper`, as two constraints.
    pub fn range(
        self,
        level: ResourceLevel,
        tag: DicomTag,
        lower: impl Into<String>,
        upper: impl Into<String>,
    ) -> Self {
        self.greater_or_equal(level, tag, lower)
            .smaller_or_equal(level, tag, upper)
    }

    /// DICOM wildcard match (`*` and `?`).
    pub fn wildcard(self, level: ResourceLevel, tag: DicomTag, pattern: impl Into<String>) -> Self {
        self.push(level, tag, ConstraintType::Wildcard, vec![pattern.into()])
    }

    /// `tag IN (values...)`.
    pub fn list<I, S>(self, level: ResourceLevel, tag: DicomTag, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(level, tag, ConstraintType::List, values)
    }

    /// Lets resources lacking the last constraint's tag match.
    pub fn optional(mut self) -> Self {
        match self.constraints.last_mut() {
            Some(last) => last.mandatory = false,
            None => self.misuse = Some("optional() called before any constraint".to_string()),
        }
        self
    }

    /// Makes the last constraint case-insensitive.
    pub fn case_insensitive(mut self) -> Self {
        match self.constraints.last_mut() {
            Some(last) => last.case_sensitive = false,
            None => {
                self.misuse = Some("case_insensitive() called before any constraint".to_string())
            }
        }
        self
    }

    /// Filters on `labels`.
    pub fn labels<I, S>(mut self, labels: I, constraint: LabelsConstraint) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self.labels_constraint = constraint;
        self
    }

    /// Skips the first `since` rows.
    pub fn since(mut self, since: u64) -> Self {
        self.limits.since = since;
        self
    }

    /// Returns at most `limit` rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limits.limit = limit;
        self
    }

    /// Builds the lookup.
    pub fn build(self) -> LookupResult<Lookup> {
        if let Some(misuse) = self.misuse {
            return Err(LookupError::InvalidConstraint(misuse));
        }

        LookupRequest {
            level: self.level,
            constraints: self.constraints,
            labels: self.labels,
            labels_constraint: self.labels_constraint,
            since: self.limits.since,
            limit: self.limits.limit,
        }
        .into_lookup()
    }
}

// =============================================================================
// Tests
// =============================================================================
