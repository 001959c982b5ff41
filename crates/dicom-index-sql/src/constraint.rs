//! Constraint model for resource lookups.
//!
//! A lookup is an ordered collection of [`DatabaseConstraint`]s, each one
//! filtering a single DICOM tag at one level of the resource hierarchy,
//! plus an optional [`LabelFilter`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{LookupError, LookupResult};

// =============================================================================
// Hierarchy
// =============================================================================

/// A level of the resource hierarchy.
///
/// Levels are totally ordered: `Patient < Study < Series < Instance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceLevel {
    /// Patient level (root).
    Patient,
    /// Study level.
    Study,
    /// Series level.
    Series,
    /// Instance level (leaf).
    Instance,
}

impl ResourceLevel {
    /// All levels from the root down.
    pub const ALL: [ResourceLevel; 4] = [
        ResourceLevel::Patient,
        ResourceLevel::Study,
        ResourceLevel::Series,
        ResourceLevel::Instance,
    ];

    /// Integer code stored in the `resourceType` column.
    pub fn code(&self) -> i64 {
        match self {
            ResourceLevel::Patient => 0,
            ResourceLevel::Study => 1,
            ResourceLevel::Series => 2,
            ResourceLevel::Instance => 3,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: i64) -> LookupResult<Self> {
        match code {
            0 => Ok(ResourceLevel::Patient),
            1 => Ok(ResourceLevel::Study),
            2 => Ok(ResourceLevel::Series),
            3 => Ok(ResourceLevel::Instance),
            _ => Err(LookupError::ParameterOutOfRange(format!(
                "unknown resource type code {}",
                code
            ))),
        }
    }

    /// The level directly above, if any.
    pub fn parent(&self) -> Option<ResourceLevel> {
        match self {
            ResourceLevel::Patient => None,
            ResourceLevel::Study => Some(ResourceLevel::Patient),
            ResourceLevel::Series => Some(ResourceLevel::Study),
            ResourceLevel::Instance => Some(ResourceLevel::Series),
        }
    }

    /// The level directly below, if any.
    pub fn child(&self) -> Option<ResourceLevel> {
        match self {
            ResourceLevel::Patient => Some(ResourceLevel::Study),
            ResourceLevel::Study => Some(ResourceLevel::Series),
            ResourceLevel::Series => Some(ResourceLevel::Instance),
            ResourceLevel::Instance => None,
        }
    }

    /// Table alias used for this level in generated SQL.
    pub fn alias(&self) -> &'static str {
        match self {
            ResourceLevel::Patient => "patients",
            ResourceLevel::Study => "studies",
            ResourceLevel::Series => "series",
            ResourceLevel::Instance => "instances",
        }
    }

    /// Levels from `upper` to `lower`, inclusive, walking down the hierarchy.
    pub fn span(upper: ResourceLevel, lower: ResourceLevel) -> impl Iterator<Item = ResourceLevel> {
        ResourceLevel::ALL
            .into_iter()
            .filter(move |level| *level >= upper && *level <= lower)
    }
}

impl fmt::Display for ResourceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceLevel::Patient => "Patient",
            ResourceLevel::Study => "Study",
            ResourceLevel::Series => "Series",
            ResourceLevel::Instance => "Instance",
        };
        f.write_str(name)
    }
}

impl FromStr for ResourceLevel {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" | "patients" => Ok(ResourceLevel::Patient),
            "study" | "studies" => Ok(ResourceLevel::Study),
            "series" => Ok(ResourceLevel::Series),
            "instance" | "instances" => Ok(ResourceLevel::Instance),
            _ => Err(LookupError::ParameterOutOfRange(format!(
                "unknown resource level: {}",
                s
            ))),
        }
    }
}

// =============================================================================
// Tags
// =============================================================================

/// A DICOM tag, identified by its group and element numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DicomTag {
    /// Group number.
    pub group: u16,
    /// Element number.
    pub element: u16,
}

impl DicomTag {
    /// Creates a tag from its group and element.
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// (0010,0020) Patient ID.
    pub const PATIENT_ID: DicomTag = DicomTag::new(0x0010, 0x0020);
    /// (0010,0010) Patient's Name.
    pub const PATIENT_NAME: DicomTag = DicomTag::new(0x0010, 0x0010);
    /// (0020,000d) Study Instance UID.
    pub const STUDY_INSTANCE_UID: DicomTag = DicomTag::new(0x0020, 0x000d);
    /// (0008,0050) Accession Number.
    pub const ACCESSION_NUMBER: DicomTag = DicomTag::new(0x0008, 0x0050);
    /// (0008,1030) Study Description.
    pub const STUDY_DESCRIPTION: DicomTag = DicomTag::new(0x0008, 0x1030);
    /// (0008,0020) Study Date.
    pub const STUDY_DATE: DicomTag = DicomTag::new(0x0008, 0x0020);
    /// (0020,000e) Series Instance UID.
    pub const SERIES_INSTANCE_UID: DicomTag = DicomTag::new(0x0020, 0x000e);
    /// (0008,0060) Modality.
    pub const MODALITY: DicomTag = DicomTag::new(0x0008, 0x0060);
    /// (0008,0018) SOP Instance UID.
    pub const SOP_INSTANCE_UID: DicomTag = DicomTag::new(0x0008, 0x0018);
    /// (0020,0013) Instance Number.
    pub const INSTANCE_NUMBER: DicomTag = DicomTag::new(0x0020, 0x0013);
}

impl fmt::Display for DicomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x},{:04x}", self.group, self.element)
    }
}

impl FromStr for DicomTag {
    type Err = LookupError;

    /// Parses `gggg,eeee` (hexadecimal, optionally parenthesized).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let invalid = || LookupError::ParameterOutOfRange(format!("invalid DICOM tag: {}", s));

        let (group, element) = trimmed.split_once(',').ok_or_else(invalid)?;
        if group.len() != 4 || element.len() != 4 {
            return Err(invalid());
        }

        let group = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
        let element = u16::from_str_radix(element, 16).map_err(|_| invalid())?;
        Ok(DicomTag::new(group, element))
    }
}

/// Identifier tags indexed in the dedicated identifier table, per level.
pub const IDENTIFIER_TAGS: &[(ResourceLevel, DicomTag)] = &[
    (ResourceLevel::Patient, DicomTag::PATIENT_ID),
    (ResourceLevel::Study, DicomTag::STUDY_INSTANCE_UID),
    (ResourceLevel::Study, DicomTag::ACCESSION_NUMBER),
    (ResourceLevel::Series, DicomTag::SERIES_INSTANCE_UID),
    (ResourceLevel::Instance, DicomTag::SOP_INSTANCE_UID),
];

/// Whether `tag` is an identifier tag at `level`.
pub fn is_identifier_tag(level: ResourceLevel, tag: DicomTag) -> bool {
    IDENTIFIER_TAGS
        .iter()
        .any(|(l, t)| *l == level && *t == tag)
}

/// Normalizes a value stored in (or looked up against) the identifier table.
///
/// Upper-cases, drops non-printable characters, turns `%` and `_` into
/// spaces (they would act as SQL wildcards) and strips surrounding spaces.
pub fn normalize_identifier(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());

    for c in value.chars() {
        if c == '%' || c == '_' {
            normalized.push(' ');
        } else if c.is_ascii() && !c.is_ascii_control() {
            normalized.push(c.to_ascii_uppercase());
        }
    }

    normalized.trim_matches(' ').to_string()
}

// =============================================================================
// Constraints
// =============================================================================

/// How a constraint compares the stored tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintType {
    /// `value = x`
    Equal,
    /// `value <= x`
    SmallerOrEqual,
    /// `value >= x`
    GreaterOrEqual,
    /// DICOM wildcard matching (`*` and `?`).
    Wildcard,
    /// `value IN (x, y, ...)`
    List,
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintType::Equal => "Equal",
            ConstraintType::SmallerOrEqual => "SmallerOrEqual",
            ConstraintType::GreaterOrEqual => "GreaterOrEqual",
            ConstraintType::Wildcard => "Wildcard",
            ConstraintType::List => "List",
        };
        f.write_str(name)
    }
}

/// One filter condition on a single tag at one hierarchy level.
///
/// Immutable once built. Every kind except [`ConstraintType::List`] carries
/// exactly one value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DatabaseConstraint {
    level: ResourceLevel,
    tag: DicomTag,
    is_identifier: bool,
    constraint_type: ConstraintType,
    values: Vec<String>,
    case_sensitive: bool,
    mandatory: bool,
}

impl DatabaseConstraint {
    /// Creates a constraint, enforcing the single-value invariant.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dicom_index_sql::{ConstraintType, DatabaseConstraint, DicomTag, ResourceLevel};
    ///
    /// let constraint = DatabaseConstraint::new(
    ///     ResourceLevel::Study,
    ///     DicomTag::ACCESSION_NUMBER,
    ///     false,
    ///     ConstraintType::Equal,
    ///     vec!["ACC1".to_string()],
    ///     true,
    ///     true,
    /// )
    /// .unwrap();
    /// assert_eq!(constraint.single_value().unwrap(), "ACC1");
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        level: ResourceLevel,
        tag: DicomTag,
        is_identifier: bool,
        constraint_type: ConstraintType,
        values: Vec<String>,
        case_sensitive: bool,
        mandatory: bool,
    ) -> LookupResult<Self> {
        if constraint_type != ConstraintType::List && values.len() != 1 {
            return Err(LookupError::InvalidConstraint(format!(
                "a {} constraint on ({}) requires exactly one value, got {}",
                constraint_type,
                tag,
                values.len()
            )));
        }

        Ok(Self {
            level,
            tag,
            is_identifier,
            constraint_type,
            values,
            case_sensitive,
            mandatory,
        })
    }

    /// Hierarchy level of the constrained resource.
    pub fn level(&self) -> ResourceLevel {
        self.level
    }

    /// The constrained tag.
    pub fn tag(&self) -> DicomTag {
        self.tag
    }

    /// Whether the tag lives in the identifier table.
    pub fn is_identifier(&self) -> bool {
        self.is_identifier
    }

    /// Kind of comparison.
    pub fn constraint_type(&self) -> ConstraintType {
        self.constraint_type
    }

    /// All values, in order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The single value of a non-list constraint.
    pub fn single_value(&self) -> LookupResult<&str> {
        match self.values.as_slice() {
            [value] => Ok(value),
            _ => Err(LookupError::InvalidConstraint(format!(
                "constraint on ({}) does not have a single value",
                self.tag
            ))),
        }
    }

    /// Whether comparisons are case-sensitive.
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Whether a resource lacking the tag is excluded.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Whether this constraint matches everything and can be dropped:
    /// an optional wildcard whose pattern is a lone `*`.
    pub fn is_universal(&self) -> bool {
        !self.mandatory
            && self.constraint_type == ConstraintType::Wildcard
            && self.values.len() == 1
            && self.values[0] == "*"
    }
}

/// Ordered collection of constraints.
///
/// Insertion order is significant: it determines the join alias assigned
/// to each rendered constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DatabaseConstraints {
    constraints: Vec<DatabaseConstraint>,
}

impl DatabaseConstraints {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a constraint.
    pub fn add(&mut self, constraint: DatabaseConstraint) {
        self.constraints.push(constraint);
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if there are no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraint at `index`.
    pub fn get(&self, index: usize) -> Option<&DatabaseConstraint> {
        self.constraints.get(index)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, DatabaseConstraint> {
        self.constraints.iter()
    }

    /// Constraints that filter anything, skipping universal wildcards.
    pub fn effective(&self) -> impl Iterator<Item = &DatabaseConstraint> {
        self.constraints.iter().filter(|c| !c.is_universal())
    }

    /// Whether every effective constraint targets `level`.
    pub fn is_single_level(&self, level: ResourceLevel) -> bool {
        self.effective().all(|c| c.level == level)
    }

    /// Span of levels touched by the effective constraints, widened to
    /// include `query_level`.
    ///
    /// Returns `(upper, lower)` with `upper <= query_level <= lower`.
    /// Universal wildcards are elided from the query, so they never widen
    /// the span.
    pub fn level_span(&self, query_level: ResourceLevel) -> (ResourceLevel, ResourceLevel) {
        self.effective()
            .fold((query_level, query_level), |(upper, lower), c| {
                (upper.min(c.level), lower.max(c.level))
            })
    }
}

impl FromIterator<DatabaseConstraint> for DatabaseConstraints {
    fn from_iter<I: IntoIterator<Item = DatabaseConstraint>>(iter: I) -> Self {
        Self {
            constraints: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DatabaseConstraints {
    type Item = &'a DatabaseConstraint;
    type IntoIter = std::slice::Iter<'a, DatabaseConstraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}

// =============================================================================
// Caller requests
// =============================================================================

/// A tag constraint as issued by the host, before storage classification.
///
/// [`into_database_constraint`](Self::into_database_constraint) decides
/// which table the tag lives in and normalizes identifier values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagConstraint {
    /// Level of the constrained resource.
    pub level: ResourceLevel,
    /// The constrained tag.
    pub tag: DicomTag,
    /// Kind of comparison.
    pub constraint_type: ConstraintType,
    /// Values to compare against.
    pub values: Vec<String>,
    /// Whether comparisons are case-sensitive.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub case_sensitive: bool,
    /// Whether a resource lacking the tag is excluded.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub mandatory: bool,
}

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

impl TagConstraint {
    /// Classifies the tag and builds the storage-level constraint.
    ///
    /// Identifier tags are looked up case-sensitively against normalized
    /// values, since the identifier table only stores normalized strings.
    pub fn into_database_constraint(self) -> LookupResult<DatabaseConstraint> {
        if is_identifier_tag(self.level, self.tag) {
            let values = self.values.iter().map(|v| normalize_identifier(v)).collect();
            DatabaseConstraint::new(
                self.level,
                self.tag,
                true,
                self.constraint_type,
                values,
                true,
                self.mandatory,
            )
        } else {
            DatabaseConstraint::new(
                self.level,
                self.tag,
                false,
                self.constraint_type,
                self.values,
                self.case_sensitive,
                self.mandatory,
            )
        }
    }
}

// =============================================================================
// Labels
// =============================================================================

/// How a set of labels filters resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabelsConstraint {
    /// The resource carries every label.
    #[default]
    All,
    /// The resource carries at least one label.
    Any,
    /// The resource carries none of the labels.
    None,
}

/// A label-set filter. An empty set filters nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelFilter {
    labels: BTreeSet<String>,
    constraint: LabelsConstraint,
}

impl LabelFilter {
    /// A filter that matches everything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a filter over `labels`.
    pub fn new<I, S>(labels: I, constraint: LabelsConstraint) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            constraint,
        }
    }

    /// The labels, sorted.
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// The filter semantics.
    pub fn constraint(&self) -> LabelsConstraint {
        self.constraint
    }

    /// Returns true if the filter does not restrict anything.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_level_ordering() {
        assert!(ResourceLevel::Patient < ResourceLevel::Study);
        assert!(ResourceLevel::Study < ResourceLevel::Series);
        assert!(ResourceLevel::Series < ResourceLevel::Instance);
    }

    #[test]
    fn test_level_codes_round_trip() {
        for level in ResourceLevel::ALL {
            assert_eq!(ResourceLevel::from_code(level.code()).unwrap(), level);
        }
        assert!(ResourceLevel::from_code(7).is_err());
    }

    #[test]
    fn test_level_navigation() {
        assert_eq!(ResourceLevel::Patient.parent(), None);
        assert_eq!(ResourceLevel::Series.parent(), Some(ResourceLevel::Study));
        assert_eq!(ResourceLevel::Series.child(), Some(ResourceLevel::Instance));
        assert_eq!(ResourceLevel::Instance.child(), None);
    }

    #[test]
    fn test_level_span() {
        let span: Vec<_> = ResourceLevel::span(ResourceLevel::Study, ResourceLevel::Instance).collect();
        assert_eq!(
            span,
            vec![ResourceLevel::Study, ResourceLevel::Series, ResourceLevel::Instance]
        );
    }

    #[test]
    fn test_tag_display_and_parse() {
        assert_eq!(DicomTag::ACCESSION_NUMBER.to_string(), "0008,0050");
        assert_eq!("0020,000D".parse::<DicomTag>().unwrap(), DicomTag::STUDY_INSTANCE_UID);
        assert_eq!("(0010,0020)".parse::<DicomTag>().unwrap(), DicomTag::PATIENT_ID);
        assert!("10,20".parse::<DicomTag>().is_err());
        assert!("zzzz,0000".parse::<DicomTag>().is_err());
    }

    #[test]
    fn test_list_constraint_accepts_any_value_count() {
        for count in [0usize, 1, 3] {
            let items: Vec<String> = (0..count).map(|i| format!("V{}", i)).collect();
            let constraint = DatabaseConstraint::new(
                ResourceLevel::Series,
                DicomTag::MODALITY,
                false,
                ConstraintType::List,
                items,
                true,
                true,
            );
            assert!(constraint.is_ok(), "list with {} values", count);
        }
    }

    #[test]
    fn test_equal_constraint_requires_one_value() {
        for bad in [values(&[]), values(&["A", "B"])] {
            let result = DatabaseConstraint::new(
                ResourceLevel::Study,
                DicomTag::ACCESSION_NUMBER,
                false,
                ConstraintType::Equal,
                bad,
                true,
                true,
            );
            assert!(matches!(result, Err(LookupError::InvalidConstraint(_))));
        }
    }

    #[test]
    fn test_universal_wildcard_detection() {
        let optional = DatabaseConstraint::new(
            ResourceLevel::Study,
            DicomTag::STUDY_DESCRIPTION,
            false,
            ConstraintType::Wildcard,
            values(&["*"]),
            true,
            false,
        )
        .unwrap();
        assert!(optional.is_universal());

        let mandatory = DatabaseConstraint::new(
            ResourceLevel::Study,
            DicomTag::STUDY_DESCRIPTION,
            false,
            ConstraintType::Wildcard,
            values(&["*"]),
            true,
            true,
        )
        .unwrap();
        assert!(!mandatory.is_universal());
    }

    #[test]
    fn test_collection_level_span() {
        let mut lookup = DatabaseConstraints::new();
        assert_eq!(
            lookup.level_span(ResourceLevel::Study),
            (ResourceLevel::Study, ResourceLevel::Study)
        );

        lookup.add(
            DatabaseConstraint::new(
                ResourceLevel::Patient,
                DicomTag::PATIENT_ID,
                true,
                ConstraintType::Equal,
                values(&["P1"]),
                true,
                true,
            )
            .unwrap(),
        );
        lookup.add(
            DatabaseConstraint::new(
                ResourceLevel::Series,
                DicomTag::MODALITY,
                false,
                ConstraintType::Equal,
                values(&["CT"]),
                true,
                true,
            )
            .unwrap(),
        );

        assert_eq!(
            lookup.level_span(ResourceLevel::Study),
            (ResourceLevel::Patient, ResourceLevel::Series)
        );
        assert!(!lookup.is_single_level(ResourceLevel::Study));
    }

    #[test]
    fn test_level_span_skips_universal_wildcards() {
        let lookup: DatabaseConstraints = [DatabaseConstraint::new(
            ResourceLevel::Instance,
            DicomTag::SOP_INSTANCE_UID,
            true,
            ConstraintType::Wildcard,
            values(&["*"]),
            true,
            false,
        )
        .unwrap()]
        .into_iter()
        .collect();

        assert_eq!(
            lookup.level_span(ResourceLevel::Series),
            (ResourceLevel::Series, ResourceLevel::Series)
        );
        assert!(lookup.is_single_level(ResourceLevel::Series));
        assert_eq!(lookup.effective().count(), 0);
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  abc_def%g "), "ABC DEF G");
        assert_eq!(normalize_identifier("1.2.840\t.5"), "1.2.840.5");
        assert_eq!(normalize_identifier("acc*"), "ACC*");
    }

    #[test]
    fn test_tag_constraint_classifies_identifiers() {
        let request = TagConstraint {
            level: ResourceLevel::Patient,
            tag: DicomTag::PATIENT_ID,
            constraint_type: ConstraintType::Equal,
            values: values(&["p_01"]),
            case_sensitive: false,
            mandatory: true,
        };
        let constraint = request.into_database_constraint().unwrap();
        assert!(constraint.is_identifier());
        assert!(constraint.is_case_sensitive());
        assert_eq!(constraint.values(), &["P 01".to_string()]);

        let request = TagConstraint {
            level: ResourceLevel::Patient,
            tag: DicomTag::PATIENT_NAME,
            constraint_type: ConstraintType::Wildcard,
            values: values(&["doe*"]),
            case_sensitive: false,
            mandatory: false,
        };
        let constraint = request.into_database_constraint().unwrap();
        assert!(!constraint.is_identifier());
        assert!(!constraint.is_case_sensitive());
        assert_eq!(constraint.values(), &["doe*".to_string()]);
    }

    #[test]
    fn test_label_filter() {
        let filter = LabelFilter::new(["b", "a", "a"], LabelsConstraint::Any);
        assert_eq!(filter.labels().len(), 2);
        assert_eq!(filter.labels().iter().next().unwrap(), "a");
        assert_eq!(filter.constraint(), LabelsConstraint::Any);
        assert!(LabelFilter::none().is_empty());
    }
}
