//! Lookup planning.
//!
//! Describes how a lookup will be compiled without generating SQL: which
//! strategy applies, which hierarchy levels get joined, which constraints
//! are rendered and which are elided. Used by
//! [`compile_lookup`](crate::compile_lookup) to choose a strategy and by
//! callers that want to log or display a lookup.

use std::fmt;

use crate::constraint::{DatabaseConstraints, LabelFilter, ResourceLevel};

/// Compilation strategy of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LookupStrategy {
    /// One `IN (SELECT ...)` sub-select per constraint on the query level.
    SingleLevel,
    /// Self-joins over every spanned level, one join per constraint.
    MultiLevel,
}

impl fmt::Display for LookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupStrategy::SingleLevel => write!(f, "single-level"),
            LookupStrategy::MultiLevel => write!(f, "multi-level"),
        }
    }
}

/// What happens to one constraint during compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Position of the constraint in the lookup.
    pub index: usize,
    /// Human-readable description (`Study (0008,0050) Equal`).
    pub description: String,
    /// Join alias in the multi-level strategy, `None` when elided.
    pub alias: Option<String>,
    /// Whether the constraint is outer-joined.
    pub optional: bool,
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) if self.optional => write!(f, "{} -> {} (optional)", self.description, alias),
            Some(alias) => write!(f, "{} -> {}", self.description, alias),
            None => write!(f, "{} (elided)", self.description),
        }
    }
}

/// Plan of a lookup.
///
/// # Example
///
/// ```ignore
/// let plan = LookupPlan::new(&lookup, ResourceLevel::Study, &labels);
///
/// println!("{}", plan);
/// if plan.distinct {
///     println!("descendant joins fan out, results are deduplicated");
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPlan {
    /// Level of the returned resources.
    pub query_level: ResourceLevel,
    /// Chosen strategy.
    pub strategy: LookupStrategy,
    /// Topmost level joined.
    pub upper_level: ResourceLevel,
    /// Bottommost level joined.
    pub lower_level: ResourceLevel,
    /// Whether the multi-level query needs `SELECT DISTINCT`.
    pub distinct: bool,
    /// One step per constraint, in lookup order.
    pub steps: Vec<PlanStep>,
    /// Number of labels filtered on.
    pub label_count: usize,
    /// Notes about the lookup.
    pub hints: Vec<String>,
}

impl LookupPlan {
    /// Plans `lookup` at `query_level`.
    pub fn new(lookup: &DatabaseConstraints, query_level: ResourceLevel, labels: &LabelFilter) -> Self {
        let (upper_level, lower_level) = lookup.level_span(query_level);

        let strategy = if lookup.is_single_level(query_level) {
            LookupStrategy::SingleLevel
        } else {
            LookupStrategy::MultiLevel
        };

        let mut steps = Vec::with_capacity(lookup.len());
        let mut rendered = 0usize;

        for (index, constraint) in lookup.iter().enumerate() {
            let description = format!(
                "{} ({}) {}",
                constraint.level(),
                constraint.tag(),
                constraint.constraint_type()
            );

            let alias = if constraint.is_universal() {
                None
            } else {
                rendered += 1;
                Some(format!("t{}", rendered - 1))
            };

            steps.push(PlanStep {
                index,
                description,
                alias,
                optional: !constraint.is_mandatory(),
            });
        }

        let mut plan = Self {
            query_level,
            strategy,
            upper_level,
            lower_level,
            distinct: lower_level > query_level,
            steps,
            label_count: labels.labels().len(),
            hints: Vec::new(),
        };

        plan.generate_hints();
        plan
    }

    /// Number of constraints that end up in the SQL.
    pub fn rendered_count(&self) -> usize {
        self.steps.iter().filter(|s| s.alias.is_some()).count()
    }

    /// Number of `Resources` self-joins in the multi-level query.
    pub fn level_joins(&self) -> usize {
        ResourceLevel::span(self.upper_level, self.lower_level).count() - 1
    }

    fn generate_hints(&mut self) {
        let elided = self.steps.len() - self.rendered_count();
        if elided > 0 {
            self.hints
                .push(format!("{} universal wildcard constraint(s) dropped", elided));
        }

        if self.distinct {
            self.hints.push(format!(
                "constraints below {} level fan out, results are deduplicated",
                self.query_level
            ));
        }

        if self.strategy == LookupStrategy::SingleLevel && self.steps.len() > 1 {
            self.hints
                .push("single-level lookup avoids self-joins".to_string());
        }
    }
}

impl fmt::Display for LookupPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lookup at {} level ({})", self.query_level, self.strategy)?;
        writeln!(
            f,
            "Levels: {} to {} ({} join(s))",
            self.upper_level,
            self.lower_level,
            self.level_joins()
        )?;

        if !self.steps.is_empty() {
            writeln!(f)?;
            writeln!(f, "Constraints:")?;
            for step in &self.steps {
                writeln!(f, "  {}. {}", step.index + 1, step)?;
            }
        }

        if self.label_count > 0 {
            writeln!(f)?;
            writeln!(f, "Labels: {}", self.label_count)?;
        }

        if !self.hints.is_empty() {
            writeln!(f)?;
            writeln!(f, "Hints:")?;
            for hint in &self.hints {
                writeln!(f, "  - {}", hint)?;
            }
        }

        Ok(())
    }
}

/// Plans `lookup` at `query_level`. Shorthand for [`LookupPlan::new`].
pub fn explain(lookup: &DatabaseConstraints, query_level: ResourceLevel, labels: &LabelFilter) -> LookupPlan {
    LookupPlan::new(lookup, query_level, labels)
}
