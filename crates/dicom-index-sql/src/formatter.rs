//! Dialect strategy used while compiling a lookup.
//!
//! The compiler never inlines a caller-supplied string into SQL text: every
//! value is handed to [`LookupFormatter::generate_parameter`], which records
//! it under a fresh name and returns the `${name}` placeholder to embed.
//! A formatter is therefore stateful and must not be reused across
//! compilations.

use crate::constraint::ResourceLevel;
use crate::dialect::Dialect;
use crate::value::{Dictionary, Value};

/// Per-dialect formatting hooks for the lookup compiler.
pub trait LookupFormatter {
    /// Registers `value` as a new bind parameter and returns its placeholder.
    fn generate_parameter(&mut self, value: &str) -> String;

    /// SQL literal for the `resourceType` column at `level`.
    fn format_resource_type(&self, level: ResourceLevel) -> String;

    /// Clause appended after a `LIKE` pattern.
    fn format_wildcard_escape(&self) -> String;

    /// Pagination suffix (empty when `since` and `limit` are both zero).
    fn format_limits(&self, since: u64, limit: u64) -> String;

    /// A `NULL` literal typed as `sql_type`.
    fn format_null(&self, sql_type: &str) -> String;

    /// Whether `[` and `]` must be escaped in `LIKE` patterns.
    fn is_escape_brackets(&self) -> bool;
}

/// [`LookupFormatter`] driven by a [`Dialect`].
///
/// Parameters are named `p0`, `p1`, ... in the order they are generated.
#[derive(Debug, Clone)]
pub struct DialectFormatter {
    dialect: Dialect,
    count: usize,
    parameters: Dictionary,
}

impl DialectFormatter {
    /// Creates a formatter with an empty parameter dictionary.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            count: 0,
            parameters: Dictionary::new(),
        }
    }

    /// The dialect being generated.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Parameters generated so far.
    pub fn parameters(&self) -> &Dictionary {
        &self.parameters
    }

    /// Consumes the formatter, returning the generated parameters.
    pub fn into_parameters(self) -> Dictionary {
        self.parameters
    }
}

impl LookupFormatter for DialectFormatter {
    fn generate_parameter(&mut self, value: &str) -> String {
        let name = format!("p{}", self.count);
        self.count += 1;
        self.parameters.set(name.clone(), Value::Utf8(value.to_string()));
        format!("${{{}}}", name)
    }

    fn format_resource_type(&self, level: ResourceLevel) -> String {
        level.code().to_string()
    }

    fn format_wildcard_escape(&self) -> String {
        self.dialect.wildcard_escape().to_string()
    }

    fn format_limits(&self, since: u64, limit: u64) -> String {
        self.dialect.limits(since, limit)
    }

    fn format_null(&self, sql_type: &str) -> String {
        self.dialect.null_cast(sql_type)
    }

    fn is_escape_brackets(&self) -> bool {
        self.dialect.escapes_brackets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_parameter_numbering() {
        let mut formatter = DialectFormatter::new(Dialect::SQLite);
        assert_eq!(formatter.generate_parameter("a"), "${p0}");
        assert_eq!(formatter.generate_parameter("b"), "${p1}");
        assert_eq!(formatter.generate_parameter("a"), "${p2}");

        let params = formatter.into_parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(params.get("p2"), Some(&Value::Utf8("a".to_string())));
    }

    #[test]
    fn test_fresh_formatter_restarts_numbering() {
        let mut first = DialectFormatter::new(Dialect::PostgreSQL);
        first.generate_parameter("x");
        let mut second = DialectFormatter::new(Dialect::PostgreSQL);
        assert_eq!(second.generate_parameter("y"), "${p0}");
    }

    #[test]
    fn test_resource_type_codes() {
        let formatter = DialectFormatter::new(Dialect::MySQL);
        assert_eq!(formatter.format_resource_type(ResourceLevel::Patient), "0");
        assert_eq!(formatter.format_resource_type(ResourceLevel::Study), "1");
        assert_eq!(formatter.format_resource_type(ResourceLevel::Instance), "3");
    }

    #[test]
    fn test_delegates_to_dialect() {
        let formatter = DialectFormatter::new(Dialect::MSSQL);
        assert!(formatter.is_escape_brackets());
        assert_eq!(formatter.format_wildcard_escape(), r"ESCAPE '\'");
        assert_eq!(formatter.format_null("INT"), "CAST(NULL AS INT)");
        assert_eq!(
            formatter.format_limits(0, 5),
            " ORDER BY 1 OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }
}
