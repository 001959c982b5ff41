//! SQL dialects supported by the index.
//!
//! Only a handful of syntactic details differ between the engines: how a
//! result set is paginated, how `LIKE` escapes are spelled, whether square
//! brackets are wildcard metacharacters, and how a typed `NULL` is cast.

use std::fmt;
use std::str::FromStr;

use crate::error::LookupError;

/// A target SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dialect {
    /// PostgreSQL.
    PostgreSQL,
    /// MySQL / MariaDB.
    MySQL,
    /// SQLite.
    SQLite,
    /// Microsoft SQL Server (through ODBC).
    MSSQL,
}

impl Dialect {
    /// All supported dialects.
    pub const ALL: [Dialect; 4] = [
        Dialect::PostgreSQL,
        Dialect::MySQL,
        Dialect::SQLite,
        Dialect::MSSQL,
    ];

    /// Clause appended after a `LIKE` pattern so that backslash escapes work.
    ///
    /// MySQL treats a backslash as an escape inside string literals, hence
    /// the doubled character.
    pub fn wildcard_escape(&self) -> &'static str {
        match self {
            Dialect::PostgreSQL | Dialect::SQLite | Dialect::MSSQL => "ESCAPE '\\'",
            Dialect::MySQL => "ESCAPE '\\\\'",
        }
    }

    /// Whether `[` and `]` are `LIKE` metacharacters that must be escaped.
    pub fn escapes_brackets(&self) -> bool {
        matches!(self, Dialect::MSSQL)
    }

    /// Pagination suffix for `since` skipped rows and at most `limit` rows.
    ///
    /// Returns an empty string when both are zero.
    pub fn limits(&self, since: u64, limit: u64) -> String {
        match (self, since, limit) {
            (_, 0, 0) => String::new(),
            (Dialect::MSSQL, since, 0) => format!(" ORDER BY 1 OFFSET {} ROWS", since),
            (Dialect::MSSQL, since, limit) => format!(
                " ORDER BY 1 OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                since, limit
            ),
            (_, 0, limit) => format!(" LIMIT {}", limit),
            (Dialect::PostgreSQL, since, 0) => format!(" OFFSET {}", since),
            (Dialect::SQLite, since, 0) => format!(" LIMIT -1 OFFSET {}", since),
            (Dialect::MySQL, since, 0) => format!(" LIMIT {}, 18446744073709551615", since),
            (_, since, limit) => format!(" LIMIT {} OFFSET {}", limit, since),
        }
    }

    /// A `NULL` literal typed as `sql_type`.
    pub fn null_cast(&self, sql_type: &str) -> String {
        match self {
            Dialect::PostgreSQL => format!("NULL::{}", sql_type),
            Dialect::MSSQL => format!("CAST(NULL AS {})", sql_type),
            Dialect::MySQL | Dialect::SQLite => "NULL".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::PostgreSQL => "PostgreSQL",
            Dialect::MySQL => "MySQL",
            Dialect::SQLite => "SQLite",
            Dialect::MSSQL => "MSSQL",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Dialect::PostgreSQL),
            "mysql" | "mariadb" => Ok(Dialect::MySQL),
            "sqlite" => Ok(Dialect::SQLite),
            "mssql" | "sqlserver" | "odbc" => Ok(Dialect::MSSQL),
            _ => Err(LookupError::UnknownDialect(s.to_string())),
        }
    }
}
