//! Parameterized SQL statements.
//!
//! Statements are written once with `${name}` placeholders and rendered
//! into the positional syntax of each driver: PostgreSQL numbers its
//! parameters (`$1`, `$2`, ...), the other engines use `?`.
//!
//! ```rust
//! use dicom_index_sql::{Dialect, Dictionary, Query};
//!
//! let query = Query::parse("SELECT publicId FROM Resources WHERE internalId=${id}").unwrap();
//! let rendered = query.render(Dialect::PostgreSQL);
//! assert_eq!(rendered.sql, "SELECT publicId FROM Resources WHERE internalId=$1");
//!
//! let values = rendered.bind(&Dictionary::new().with("id", 42i64)).unwrap();
//! assert_eq!(values.len(), 1);
//! ```

use std::collections::BTreeSet;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::char,
    combinator::{all_consuming, map, not, recognize},
    multi::{many0, many1},
    sequence::{delimited, terminated},
    IResult,
};

use crate::dialect::Dialect;
use crate::error::{LookupError, LookupResult};
use crate::value::{Dictionary, Value};

/// A piece of a parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Verbatim SQL text.
    Literal(String),
    /// A `${name}` placeholder.
    Parameter(String),
}

/// A statement split into literal text and named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    tokens: Vec<Token>,
    read_only: bool,
}

/// A statement rendered for one dialect, with the parameter names to bind
/// in positional order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    /// Driver-ready SQL text.
    pub sql: String,
    /// Names of the positional parameters, in binding order.
    pub parameters: Vec<String>,
}

impl RenderedQuery {
    /// Resolves the positional parameters against `dictionary`.
    pub fn bind(&self, dictionary: &Dictionary) -> LookupResult<Vec<Value>> {
        self.parameters
            .iter()
            .map(|name| {
                dictionary
                    .get(name)
                    .cloned()
                    .ok_or_else(|| LookupError::InexistentItem(name.clone()))
            })
            .collect()
    }
}

impl Query {
    /// Parses SQL text containing `${name}` placeholders.
    ///
    /// Names are made of ASCII letters, digits and underscores. A `$` not
    /// followed by `{` is kept verbatim.
    pub fn parse(sql: &str) -> LookupResult<Self> {
        match all_consuming(many0(token))(sql) {
            Ok((_, tokens)) => Ok(Self {
                read_only: is_select(sql),
                tokens,
            }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(LookupError::ParseError {
                position: sql.len() - e.input.len(),
                message: format!("malformed parameter at: '{}'", truncate(e.input, 20)),
            }),
            Err(nom::Err::Incomplete(_)) => Err(LookupError::ParseError {
                position: sql.len(),
                message: "incomplete statement".to_string(),
            }),
        }
    }

    /// The parsed tokens.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Distinct parameter names referenced by the statement.
    pub fn parameter_names(&self) -> BTreeSet<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Parameter(name) => Some(name.as_str()),
                Token::Literal(_) => None,
            })
            .collect()
    }

    /// Whether the statement is a plain `SELECT`.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Renders the statement for `dialect`.
    pub fn render(&self, dialect: Dialect) -> RenderedQuery {
        let mut sql = String::new();
        let mut parameters: Vec<String> = Vec::new();

        for token in &self.tokens {
            match token {
                Token::Literal(text) => sql.push_str(text),
                Token::Parameter(name) => match dialect {
                    Dialect::PostgreSQL => {
                        let index = match parameters.iter().position(|p| p == name) {
                            Some(index) => index,
                            None => {
                                parameters.push(name.clone());
                                parameters.len() - 1
                            }
                        };
                        sql.push_str(&format!("${}", index + 1));
                    }
                    Dialect::MySQL | Dialect::SQLite | Dialect::MSSQL => {
                        parameters.push(name.clone());
                        sql.push('?');
                    }
                },
            }
        }

        RenderedQuery { sql, parameters }
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
}

// ============================================================================
// Grammar
// ============================================================================

fn token(input: &str) -> IResult<&str, Token> {
    alt((parameter, literal))(input)
}

fn parameter(input: &str) -> IResult<&str, Token> {
    map(delimited(tag("${"), parameter_name, char('}')), |name: &str| {
        Token::Parameter(name.to_string())
    })(input)
}

fn parameter_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn literal(input: &str) -> IResult<&str, Token> {
    map(
        recognize(many1(alt((is_not("$"), terminated(tag("$"), not(char('{'))))))),
        |text: &str| Token::Literal(text.to_string()),
    )(input)
}
