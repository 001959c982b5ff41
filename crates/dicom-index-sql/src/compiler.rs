//! SQL lookup compiler.
//!
//! Turns a [`DatabaseConstraints`] collection, a query level, a
//! [`LabelFilter`] and pagination limits into a `SELECT publicId, internalId`
//! statement plus its parameter dictionary.
//!
//! Two strategies are available:
//!
//! - [`apply`] joins the `Resources` table once per level spanned by the
//!   constraints and once per rendered constraint (`t0`, `t1`, ...). It
//!   handles constraints at any level.
//! - [`apply_single_level`] filters the query level alone through
//!   `internalId IN (SELECT id ...)` sub-selects. It only accepts
//!   constraints at the query level, but avoids the N-way self-join.
//!
//! Both strategies drop optional wildcard constraints whose pattern is a
//! lone `*`: such a constraint matches every resource, and rendering it
//! would still change which rows are outer-joined.
//!
//! # Example
//!
//! ```rust
//! use dicom_index_sql::{
//!     compile, ConstraintType, DatabaseConstraint, DatabaseConstraints, Dialect, DicomTag,
//!     LabelFilter, Limits, ResourceLevel,
//! };
//!
//! let mut lookup = DatabaseConstraints::new();
//! lookup.add(DatabaseConstraint::new(
//!     ResourceLevel::Study,
//!     DicomTag::ACCESSION_NUMBER,
//!     false,
//!     ConstraintType::Equal,
//!     vec!["ACC1".to_string()],
//!     true,
//!     true,
//! ).unwrap());
//!
//! let compiled = compile(
//!     Dialect::SQLite,
//!     &lookup,
//!     ResourceLevel::Study,
//!     &LabelFilter::none(),
//!     Limits::none(),
//! ).unwrap();
//!
//! assert!(compiled.sql.contains("t0.value = ${p0}"));
//! assert!(!compiled.sql.contains("ACC1"));
//! ```

use crate::constraint::{
    ConstraintType, DatabaseConstraint, DatabaseConstraints, LabelFilter, LabelsConstraint,
    ResourceLevel,
};
use crate::dialect::Dialect;
use crate::error::{LookupError, LookupResult};
use crate::formatter::{DialectFormatter, LookupFormatter};
use crate::plan::{LookupPlan, LookupStrategy};
use crate::value::Dictionary;

/// Table holding the generic main DICOM tags.
pub const MAIN_DICOM_TAGS_TABLE: &str = "MainDicomTags";

/// Table holding the normalized identifier tags.
pub const DICOM_IDENTIFIERS_TABLE: &str = "DicomIdentifiers";

/// Pagination of a lookup: skip `since` rows, return at most `limit`
/// (zero means unlimited).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    /// Number of rows to skip.
    pub since: u64,
    /// Maximum number of rows (0 = unlimited).
    pub limit: u64,
}

impl Limits {
    /// No pagination.
    pub fn none() -> Self {
        Self::default()
    }

    /// At most `limit` rows.
    pub fn limit(limit: u64) -> Self {
        Self { since: 0, limit }
    }

    /// Skip `since` rows, then return at most `limit` rows.
    pub fn paged(since: u64, limit: u64) -> Self {
        Self { since, limit }
    }
}

/// Output of a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledLookup {
    /// SQL text with `${name}` placeholders.
    pub sql: String,
    /// Values of every placeholder in `sql`.
    pub parameters: Dictionary,
    /// Strategy used to generate `sql`.
    pub strategy: LookupStrategy,
}

// =============================================================================
// Entry points
// =============================================================================

/// Compiles with the generic multi-level strategy.
pub fn compile(
    dialect: Dialect,
    lookup: &DatabaseConstraints,
    query_level: ResourceLevel,
    labels: &LabelFilter,
    limits: Limits,
) -> LookupResult<CompiledLookup> {
    let mut formatter = DialectFormatter::new(dialect);
    let sql = apply(&mut formatter, lookup, query_level, labels, limits)?;
    Ok(CompiledLookup {
        sql,
        parameters: formatter.into_parameters(),
        strategy: LookupStrategy::MultiLevel,
    })
}

/// Compiles with the single-level strategy.
///
/// Fails with [`LookupError::NotSingleLevel`] if a constraint targets
/// another level than `query_level`.
pub fn compile_single_level(
    dialect: Dialect,
    lookup: &DatabaseConstraints,
    query_level: ResourceLevel,
    labels: &LabelFilter,
    limits: Limits,
) -> LookupResult<CompiledLookup> {
    let mut formatter = DialectFormatter::new(dialect);
    let sql = apply_single_level(&mut formatter, lookup, query_level, labels, limits)?;
    Ok(CompiledLookup {
        sql,
        parameters: formatter.into_parameters(),
        strategy: LookupStrategy::SingleLevel,
    })
}

/// Compiles with the cheapest applicable strategy.
pub fn compile_lookup(
    dialect: Dialect,
    lookup: &DatabaseConstraints,
    query_level: ResourceLevel,
    labels: &LabelFilter,
    limits: Limits,
) -> LookupResult<CompiledLookup> {
    match LookupPlan::new(lookup, query_level, labels).strategy {
        LookupStrategy::SingleLevel => {
            compile_single_level(dialect, lookup, query_level, labels, limits)
        }
        LookupStrategy::MultiLevel => compile(dialect, lookup, query_level, labels, limits),
    }
}

// =============================================================================
// Generic strategy
// =============================================================================

/// Generates the multi-level lookup through `formatter`.
pub fn apply(
    formatter: &mut dyn LookupFormatter,
    lookup: &DatabaseConstraints,
    query_level: ResourceLevel,
    labels: &LabelFilter,
    limits: Limits,
) -> LookupResult<String> {
    let (upper_level, lower_level) = lookup.level_span(query_level);
    debug_assert!(upper_level <= query_level && query_level <= lower_level);

    let escape_brackets = formatter.is_escape_brackets();
    let mut joins = String::new();
    let mut comparisons = String::new();
    let mut count = 0usize;

    for constraint in lookup {
        let alias = format!("t{}", count);
        let column = format!("{}.value", alias);

        let Some(comparison) = format_comparison(formatter, constraint, &column, escape_brackets)?
        else {
            continue;
        };

        joins.push_str(&format_join(constraint, &alias));

        let predicate = if constraint.is_mandatory() {
            comparison
        } else if comparison.is_empty() {
            format!("{} IS NULL", column)
        } else {
            format!("({} IS NULL OR {})", column, comparison)
        };

        if !predicate.is_empty() {
            comparisons.push_str(" AND ");
            comparisons.push_str(&predicate);
        }

        count += 1;
    }

    let level = query_level.alias();
    let distinct = if lower_level > query_level { "DISTINCT " } else { "" };

    let mut sql = format!(
        "SELECT {}{}.publicId, {}.internalId FROM Resources AS {}",
        distinct, level, level, level
    );

    // Ancestors: each level joined through the parentId of the level below.
    let mut current = query_level;
    while current > upper_level {
        let Some(parent) = current.parent() else { break };
        sql.push_str(&format!(
            " INNER JOIN Resources AS {} ON {}.internalId = {}.parentId",
            parent.alias(),
            parent.alias(),
            current.alias()
        ));
        current = parent;
    }

    // Descendants: each level's parentId points at the level above.
    let mut current = query_level;
    while current < lower_level {
        let Some(child) = current.child() else { break };
        sql.push_str(&format!(
            " INNER JOIN Resources AS {} ON {}.internalId = {}.parentId",
            child.alias(),
            current.alias(),
            child.alias()
        ));
        current = child;
    }

    sql.push_str(&joins);
    sql.push_str(&format!(
        " WHERE {}.resourceType = {}{}",
        level,
        formatter.format_resource_type(query_level),
        comparisons
    ));

    if !labels.is_empty() {
        let placeholders = label_placeholders(formatter, labels);
        let condition = match labels.constraint() {
            LabelsConstraint::Any => "> 0".to_string(),
            LabelsConstraint::All => format!("= {}", labels.labels().len()),
            LabelsConstraint::None => "= 0".to_string(),
        };

        sql.push_str(&format!(
            " AND (SELECT COUNT(1) FROM Labels AS selectedLabels WHERE selectedLabels.id = {}.internalId AND selectedLabels.label IN ({})) {}",
            level, placeholders, condition
        ));
    }

    sql.push_str(&formatter.format_limits(limits.since, limits.limit));
    Ok(sql)
}

fn format_join(constraint: &DatabaseConstraint, alias: &str) -> String {
    let join = if constraint.is_mandatory() {
        "INNER JOIN"
    } else {
        "LEFT JOIN"
    };

    format!(
        " {} {} AS {} ON {}.id = {}.internalId AND {}.tagGroup = {} AND {}.tagElement = {}",
        join,
        tag_table(constraint),
        alias,
        alias,
        constraint.level().alias(),
        alias,
        constraint.tag().group,
        alias,
        constraint.tag().element
    )
}

// =============================================================================
// Single-level strategy
// =============================================================================

/// Generates the single-level lookup through `formatter`.
pub fn apply_single_level(
    formatter: &mut dyn LookupFormatter,
    lookup: &DatabaseConstraints,
    query_level: ResourceLevel,
    labels: &LabelFilter,
    limits: Limits,
) -> LookupResult<String> {
    if let Some(other) = lookup.effective().find(|c| c.level() != query_level) {
        return Err(LookupError::NotSingleLevel {
            constraint: other.level().to_string(),
            query: query_level.to_string(),
        });
    }

    let escape_brackets = formatter.is_escape_brackets();
    let mut identifier_filters = Vec::new();
    let mut main_tag_filters = Vec::new();

    for constraint in lookup {
        let Some(comparison) = format_comparison(formatter, constraint, "value", escape_brackets)?
        else {
            continue;
        };

        let table = tag_table(constraint);
        let tag_filter = format!(
            "tagGroup = {} AND tagElement = {}",
            constraint.tag().group,
            constraint.tag().element
        );

        let filter = if comparison.is_empty() {
            format!("internalId IN (SELECT id FROM {} WHERE {})", table, tag_filter)
        } else if constraint.is_mandatory() {
            format!(
                "internalId IN (SELECT id FROM {} WHERE {} AND {})",
                table, tag_filter, comparison
            )
        } else {
            format!(
                "(internalId NOT IN (SELECT id FROM {} WHERE {}) OR internalId IN (SELECT id FROM {} WHERE {} AND {}))",
                table, tag_filter, table, tag_filter, comparison
            )
        };

        if constraint.is_identifier() {
            identifier_filters.push(filter);
        } else {
            main_tag_filters.push(filter);
        }
    }

    let mut sql = format!(
        "SELECT publicId, internalId FROM Resources WHERE resourceType = {}",
        formatter.format_resource_type(query_level)
    );

    for filter in identifier_filters.iter().chain(main_tag_filters.iter()) {
        sql.push_str(" AND ");
        sql.push_str(filter);
    }

    if !labels.is_empty() {
        let placeholders = label_placeholders(formatter, labels);
        let (in_or_not_in, condition) = match labels.constraint() {
            LabelsConstraint::Any => ("IN", "> 0".to_string()),
            LabelsConstraint::All => ("IN", format!("= {}", labels.labels().len())),
            LabelsConstraint::None => ("NOT IN", "> 0".to_string()),
        };

        sql.push_str(&format!(
            " AND internalId {} (SELECT id FROM (SELECT id, COUNT(1) AS labelsCount FROM Labels WHERE label IN ({}) GROUP BY id) AS temp WHERE labelsCount {})",
            in_or_not_in, placeholders, condition
        ));
    }

    sql.push_str(&formatter.format_limits(limits.since, limits.limit));
    Ok(sql)
}

// =============================================================================
// Shared rendering
// =============================================================================

fn tag_table(constraint: &DatabaseConstraint) -> &'static str {
    if constraint.is_identifier() {
        DICOM_IDENTIFIERS_TABLE
    } else {
        MAIN_DICOM_TAGS_TABLE
    }
}

fn label_placeholders(formatter: &mut dyn LookupFormatter, labels: &LabelFilter) -> String {
    labels
        .labels()
        .iter()
        .map(|label| formatter.generate_parameter(label))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the comparison of `column` against the constraint values.
///
/// Returns `None` when the constraint is universal and must be dropped,
/// and an empty string for a mandatory lone `*` (presence test only).
fn format_comparison(
    formatter: &mut dyn LookupFormatter,
    constraint: &DatabaseConstraint,
    column: &str,
    escape_brackets: bool,
) -> LookupResult<Option<String>> {
    if constraint.is_universal() {
        return Ok(None);
    }

    let case_sensitive = constraint.is_case_sensitive();
    let wrap = |expression: &str| {
        if case_sensitive {
            expression.to_string()
        } else {
            format!("lower({})", expression)
        }
    };

    let comparison = match constraint.constraint_type() {
        ConstraintType::Equal | ConstraintType::SmallerOrEqual | ConstraintType::GreaterOrEqual => {
            let op = match constraint.constraint_type() {
                ConstraintType::SmallerOrEqual => "<=",
                ConstraintType::GreaterOrEqual => ">=",
                _ => "=",
            };
            let parameter = formatter.generate_parameter(constraint.single_value()?);
            format!("{} {} {}", wrap(column), op, wrap(&parameter))
        }

        ConstraintType::List => {
            if constraint.values().is_empty() {
                // An empty list matches no stored value.
                "1 = 0".to_string()
            } else {
                let items = constraint
                    .values()
                    .iter()
                    .map(|value| wrap(&formatter.generate_parameter(value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({})", wrap(column), items)
            }
        }

        ConstraintType::Wildcard => {
            let value = constraint.single_value()?;
            if value == "*" {
                String::new()
            } else {
                let pattern = escape_wildcard(value, escape_brackets);
                let parameter = formatter.generate_parameter(&pattern);
                format!(
                    "{} LIKE {} {}",
                    wrap(column),
                    wrap(&parameter),
                    formatter.format_wildcard_escape()
                )
            }
        }
    };

    Ok(Some(comparison))
}

/// Converts a DICOM wildcard pattern into a `LIKE` pattern escaped with `\`.
pub fn escape_wildcard(value: &str, escape_brackets: bool) -> String {
    let mut escaped = String::with_capacity(value.len() + 4);

    for c in value.chars() {
        match c {
            '*' => escaped.push('%'),
            '?' => escaped.push('_'),
            '%' | '_' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '[' | ']' if escape_brackets => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::DicomTag;
    use crate::value::Value;

    fn constraint(
        level: ResourceLevel,
        tag: DicomTag,
        kind: ConstraintType,
        values: &[&str],
        case_sensitive: bool,
        mandatory: bool,
    ) -> DatabaseConstraint {
        DatabaseConstraint::new(
            level,
            tag,
            false,
            kind,
            values.iter().map(|s| s.to_string()).collect(),
            case_sensitive,
            mandatory,
        )
        .unwrap()
    }

    fn accession_lookup() -> DatabaseConstraints {
        [constraint(
            ResourceLevel::Study,
            DicomTag::ACCESSION_NUMBER,
            ConstraintType::Equal,
            &["ACC1"],
            true,
            true,
        )]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_escape_wildcard() {
        assert_eq!(escape_wildcard("A*B?", false), "A%B_");
        assert_eq!(escape_wildcard("50%_x", false), r"50\%\_x");
        assert_eq!(escape_wildcard(r"a\b", false), r"a\\b");
        assert_eq!(escape_wildcard("[x]", false), "[x]");
        assert_eq!(escape_wildcard("[x]", true), r"\[x\]");
    }

    #[test]
    fn test_accession_number_study_lookup() {
        let compiled = compile(
            Dialect::SQLite,
            &accession_lookup(),
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT studies.publicId, studies.internalId FROM Resources AS studies \
             INNER JOIN MainDicomTags AS t0 ON t0.id = studies.internalId AND t0.tagGroup = 8 AND t0.tagElement = 80 \
             WHERE studies.resourceType = 1 AND t0.value = ${p0}"
        );
        assert_eq!(compiled.parameters.get("p0"), Some(&Value::Utf8("ACC1".to_string())));
        assert!(!compiled.sql.contains("LIMIT"));
        assert_eq!(compiled.strategy, LookupStrategy::MultiLevel);
    }

    #[test]
    fn test_case_insensitive_lowers_both_sides() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Study,
            DicomTag::STUDY_DESCRIPTION,
            ConstraintType::Equal,
            &["ABC"],
            false,
            true,
        )]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::PostgreSQL,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains("lower(t0.value) = lower(${p0})"));
    }

    #[test]
    fn test_range_operators() {
        let lookup: DatabaseConstraints = [
            constraint(
                ResourceLevel::Study,
                DicomTag::STUDY_DATE,
                ConstraintType::GreaterOrEqual,
                &["20200101"],
                true,
                true,
            ),
            constraint(
                ResourceLevel::Study,
                DicomTag::STUDY_DATE,
                ConstraintType::SmallerOrEqual,
                &["20201231"],
                true,
                true,
            ),
        ]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains("t0.value >= ${p0}"));
        assert!(compiled.sql.contains("t1.value <= ${p1}"));
    }

    #[test]
    fn test_list_rendering() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Series,
            DicomTag::MODALITY,
            ConstraintType::List,
            &["CT", "MR"],
            false,
            true,
        )]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Series,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled
            .sql
            .contains("lower(t0.value) IN (lower(${p0}), lower(${p1}))"));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Series,
            DicomTag::MODALITY,
            ConstraintType::List,
            &[],
            true,
            true,
        )]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Series,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.ends_with("AND 1 = 0"));
        assert!(compiled.parameters.is_empty());
    }

    #[test]
    fn test_wildcard_rendering_per_dialect() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Patient,
            DicomTag::PATIENT_NAME,
            ConstraintType::Wildcard,
            &["DOE*"],
            true,
            true,
        )]
        .into_iter()
        .collect();

        let sqlite = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Patient,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(sqlite.sql.contains(r"t0.value LIKE ${p0} ESCAPE '\'"));
        assert_eq!(sqlite.parameters.get("p0"), Some(&Value::Utf8("DOE%".to_string())));

        let mysql = compile(
            Dialect::MySQL,
            &lookup,
            ResourceLevel::Patient,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(mysql.sql.contains(r"t0.value LIKE ${p0} ESCAPE '\\'"));
    }

    #[test]
    fn test_optional_universal_wildcard_is_elided() {
        let lookup: DatabaseConstraints = [
            constraint(
                ResourceLevel::Study,
                DicomTag::STUDY_DESCRIPTION,
                ConstraintType::Wildcard,
                &["*"],
                true,
                false,
            ),
            constraint(
                ResourceLevel::Study,
                DicomTag::ACCESSION_NUMBER,
                ConstraintType::Equal,
                &["ACC1"],
                true,
                true,
            ),
        ]
        .into_iter()
        .collect();

        let with_universal = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        let without = compile(
            Dialect::SQLite,
            &accession_lookup(),
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();

        assert_eq!(with_universal.sql, without.sql);
        assert!(!with_universal.sql.contains("LIKE"));
        assert!(!with_universal.sql.contains("t1"));
    }

    #[test]
    fn test_universal_wildcard_at_other_level_adds_no_join() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Instance,
            DicomTag::SOP_INSTANCE_UID,
            ConstraintType::Wildcard,
            &["*"],
            true,
            false,
        )]
        .into_iter()
        .collect();

        let with_universal = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Series,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        let without = compile(
            Dialect::SQLite,
            &DatabaseConstraints::new(),
            ResourceLevel::Series,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();

        assert_eq!(with_universal.sql, without.sql);
        assert!(!with_universal.sql.contains("instances"));
        assert!(!with_universal.sql.contains("DISTINCT"));

        let chosen = compile_lookup(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Series,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert_eq!(chosen.strategy, LookupStrategy::SingleLevel);
        assert!(chosen.parameters.is_empty());
    }

    #[test]
    fn test_mandatory_universal_wildcard_requires_presence() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Study,
            DicomTag::STUDY_DESCRIPTION,
            ConstraintType::Wildcard,
            &["*"],
            true,
            true,
        )]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains("INNER JOIN MainDicomTags AS t0"));
        assert!(compiled.sql.ends_with("WHERE studies.resourceType = 1"));
    }

    #[test]
    fn test_optional_constraint_uses_left_join() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Study,
            DicomTag::STUDY_DESCRIPTION,
            ConstraintType::Equal,
            &["CHEST"],
            true,
            false,
        )]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains("LEFT JOIN MainDicomTags AS t0"));
        assert!(compiled
            .sql
            .contains("AND (t0.value IS NULL OR t0.value = ${p0})"));
    }

    #[test]
    fn test_identifier_uses_identifier_table() {
        let lookup: DatabaseConstraints = [DatabaseConstraint::new(
            ResourceLevel::Patient,
            DicomTag::PATIENT_ID,
            true,
            ConstraintType::Equal,
            vec!["P1".to_string()],
            true,
            true,
        )
        .unwrap()]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Patient,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains("INNER JOIN DicomIdentifiers AS t0"));
        assert!(compiled.sql.contains("t0.tagGroup = 16 AND t0.tagElement = 32"));
    }

    #[test]
    fn test_ancestor_and_descendant_joins() {
        let lookup: DatabaseConstraints = [
            constraint(
                ResourceLevel::Patient,
                DicomTag::PATIENT_NAME,
                ConstraintType::Equal,
                &["DOE"],
                true,
                true,
            ),
            constraint(
                ResourceLevel::Instance,
                DicomTag::INSTANCE_NUMBER,
                ConstraintType::Equal,
                &["1"],
                true,
                true,
            ),
        ]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();

        assert!(compiled
            .sql
            .starts_with("SELECT DISTINCT studies.publicId, studies.internalId FROM Resources AS studies"));
        assert!(compiled
            .sql
            .contains(" INNER JOIN Resources AS patients ON patients.internalId = studies.parentId"));
        assert!(compiled
            .sql
            .contains(" INNER JOIN Resources AS series ON studies.internalId = series.parentId"));
        assert!(compiled
            .sql
            .contains(" INNER JOIN Resources AS instances ON series.internalId = instances.parentId"));
        assert!(compiled.sql.contains("t0.id = patients.internalId"));
        assert!(compiled.sql.contains("t1.id = instances.internalId"));
    }

    #[test]
    fn test_join_aliases_skip_elided_constraints() {
        let lookup: DatabaseConstraints = [
            constraint(
                ResourceLevel::Study,
                DicomTag::STUDY_DESCRIPTION,
                ConstraintType::Wildcard,
                &["*"],
                true,
                false,
            ),
            constraint(
                ResourceLevel::Study,
                DicomTag::ACCESSION_NUMBER,
                ConstraintType::Equal,
                &["A"],
                true,
                true,
            ),
        ]
        .into_iter()
        .collect();

        let compiled = compile(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains("MainDicomTags AS t0 ON t0.id = studies.internalId AND t0.tagGroup = 8 AND t0.tagElement = 80"));
    }

    #[test]
    fn test_label_conditions() {
        for (constraint, condition) in [
            (LabelsConstraint::Any, ") > 0"),
            (LabelsConstraint::All, ") = 2"),
            (LabelsConstraint::None, ") = 0"),
        ] {
            let labels = LabelFilter::new(["a", "b"], constraint);
            let compiled = compile(
                Dialect::SQLite,
                &DatabaseConstraints::new(),
                ResourceLevel::Series,
                &labels,
                Limits::none(),
            )
            .unwrap();
            assert!(compiled.sql.contains(
                "(SELECT COUNT(1) FROM Labels AS selectedLabels WHERE selectedLabels.id = series.internalId AND selectedLabels.label IN (${p0}, ${p1}))"
            ));
            assert!(compiled.sql.ends_with(condition), "{}", compiled.sql);
        }
    }

    #[test]
    fn test_limits_are_appended() {
        let compiled = compile(
            Dialect::SQLite,
            &accession_lookup(),
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::paged(10, 5),
        )
        .unwrap();
        assert!(compiled.sql.ends_with(" LIMIT 5 OFFSET 10"));
    }

    #[test]
    fn test_single_level_rendering() {
        let lookup: DatabaseConstraints = [
            constraint(
                ResourceLevel::Study,
                DicomTag::ACCESSION_NUMBER,
                ConstraintType::Equal,
                &["ACC1"],
                true,
                true,
            ),
            DatabaseConstraint::new(
                ResourceLevel::Study,
                DicomTag::STUDY_INSTANCE_UID,
                true,
                ConstraintType::Equal,
                vec!["1.2.3".to_string()],
                true,
                true,
            )
            .unwrap(),
        ]
        .into_iter()
        .collect();

        let compiled = compile_single_level(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::limit(3),
        )
        .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT publicId, internalId FROM Resources WHERE resourceType = 1 \
             AND internalId IN (SELECT id FROM DicomIdentifiers WHERE tagGroup = 32 AND tagElement = 13 AND value = ${p1}) \
             AND internalId IN (SELECT id FROM MainDicomTags WHERE tagGroup = 8 AND tagElement = 80 AND value = ${p0}) \
             LIMIT 3"
        );
    }

    #[test]
    fn test_single_level_optional_constraint() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Study,
            DicomTag::STUDY_DESCRIPTION,
            ConstraintType::Equal,
            &["CHEST"],
            true,
            false,
        )]
        .into_iter()
        .collect();

        let compiled = compile_single_level(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains(
            "(internalId NOT IN (SELECT id FROM MainDicomTags WHERE tagGroup = 8 AND tagElement = 4144) \
             OR internalId IN (SELECT id FROM MainDicomTags WHERE tagGroup = 8 AND tagElement = 4144 AND value = ${p0}))"
        ));
    }

    #[test]
    fn test_single_level_labels() {
        let labels = LabelFilter::new(["x"], LabelsConstraint::None);
        let compiled = compile_single_level(
            Dialect::SQLite,
            &DatabaseConstraints::new(),
            ResourceLevel::Study,
            &labels,
            Limits::none(),
        )
        .unwrap();
        assert!(compiled.sql.contains(
            "AND internalId NOT IN (SELECT id FROM (SELECT id, COUNT(1) AS labelsCount FROM Labels WHERE label IN (${p0}) GROUP BY id) AS temp WHERE labelsCount > 0)"
        ));
    }

    #[test]
    fn test_single_level_rejects_other_levels() {
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Series,
            DicomTag::MODALITY,
            ConstraintType::Equal,
            &["CT"],
            true,
            true,
        )]
        .into_iter()
        .collect();

        let err = compile_single_level(
            Dialect::SQLite,
            &lookup,
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap_err();
        assert!(matches!(err, LookupError::NotSingleLevel { .. }));
    }

    #[test]
    fn test_compile_lookup_picks_strategy() {
        let single = compile_lookup(
            Dialect::SQLite,
            &accession_lookup(),
            ResourceLevel::Study,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert_eq!(single.strategy, LookupStrategy::SingleLevel);

        let multi = compile_lookup(
            Dialect::SQLite,
            &accession_lookup(),
            ResourceLevel::Series,
            &LabelFilter::none(),
            Limits::none(),
        )
        .unwrap();
        assert_eq!(multi.strategy, LookupStrategy::MultiLevel);
    }

    #[test]
    fn test_values_never_inlined() {
        let secret = "O'Brien; DROP TABLE Resources";
        let lookup: DatabaseConstraints = [constraint(
            ResourceLevel::Patient,
            DicomTag::PATIENT_NAME,
            ConstraintType::Equal,
            &[secret],
            false,
            false,
        )]
        .into_iter()
        .collect();
        let labels = LabelFilter::new(["label'1"], LabelsConstraint::Any);

        for dialect in Dialect::ALL {
            for compiled in [
                compile(dialect, &lookup, ResourceLevel::Patient, &labels, Limits::none()).unwrap(),
                compile_single_level(dialect, &lookup, ResourceLevel::Patient, &labels, Limits::none())
                    .unwrap(),
            ] {
                assert!(!compiled.sql.contains(secret));
                assert!(!compiled.sql.contains("label'1"));
                assert_eq!(compiled.parameters.len(), 2);
            }
        }
    }
}
