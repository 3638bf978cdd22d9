//! Predicate evaluation.
//!
//! Predicates form a closed set dispatched by `match`. A predicate paired
//! with its query value is compiled once into a [`Condition`] (query
//! tokenization, case folding and regex compilation happen here), and the
//! condition is then tested against any number of stored values.
//!
//! | predicate         | applied to              | true iff                                    |
//! |-------------------|-------------------------|---------------------------------------------|
//! | `Equal`           | any value               | structurally equal                          |
//! | `NotEqual`        | any value               | structurally different                      |
//! | `Contains`        | tokens of stored text   | every query token (len ≥ 2) is a token      |
//! | `ContainsPrefix`  | tokens of stored text   | some token starts with the folded query     |
//! | `ContainsRegex`   | tokens of stored text   | some token fully matches the pattern        |
//! | `Prefix`          | whole stored text       | folded text starts with the folded query    |
//! | `Regex`           | whole stored text       | the whole text matches the pattern          |

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::RegexCase;
use crate::error::QueryError;
use crate::text::{fold_case, tokenize, tokenize_query};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Equal,
    NotEqual,
    Contains,
    ContainsPrefix,
    ContainsRegex,
    Prefix,
    Regex,
}

impl Predicate {
    pub const ALL: [Predicate; 7] = [
        Predicate::Equal,
        Predicate::NotEqual,
        Predicate::Contains,
        Predicate::ContainsPrefix,
        Predicate::ContainsRegex,
        Predicate::Prefix,
        Predicate::Regex,
    ];

    /// Text predicates only accept string values.
    pub fn is_text(self) -> bool {
        !matches!(self, Predicate::Equal | Predicate::NotEqual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Predicate::Equal => "equal",
            Predicate::NotEqual => "not_equal",
            Predicate::Contains => "contains",
            Predicate::ContainsPrefix => "contains_prefix",
            Predicate::ContainsRegex => "contains_regex",
            Predicate::Prefix => "prefix",
            Predicate::Regex => "regex",
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "eq" | "equal" | "=" => Ok(Predicate::Equal),
            "neq" | "not_equal" | "!=" => Ok(Predicate::NotEqual),
            "contains" => Ok(Predicate::Contains),
            "contains_prefix" => Ok(Predicate::ContainsPrefix),
            "contains_regex" => Ok(Predicate::ContainsRegex),
            "prefix" => Ok(Predicate::Prefix),
            "regex" => Ok(Predicate::Regex),
            _ => Err(format!("unknown predicate `{s}`")),
        }
    }
}

/// Stateless predicate evaluator. Carries only the regex case policy, so it
/// is `Copy` and shared freely across anchor tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredicateEngine {
    regex_case: RegexCase,
}

impl PredicateEngine {
    pub fn new(regex_case: RegexCase) -> Self {
        Self { regex_case }
    }

    pub fn regex_case(&self) -> RegexCase {
        self.regex_case
    }

    /// One-shot evaluation: `predicate(stored, query)`.
    pub fn evaluate(
        &self,
        predicate: Predicate,
        stored: &Value,
        query: &Value,
    ) -> Result<bool, QueryError> {
        self.compile(predicate, query.clone())?.test(stored)
    }

    /// Validate and pre-process a query value for repeated testing.
    ///
    /// Text predicates reject non-string query values with `TypeMismatch`;
    /// regex predicates reject malformed patterns with `InvalidPattern`.
    pub fn compile(&self, predicate: Predicate, query: Value) -> Result<Condition, QueryError> {
        let matcher = match predicate {
            Predicate::Equal => Matcher::Equal,
            Predicate::NotEqual => Matcher::NotEqual,
            _ => {
                let text = query.as_str().ok_or(QueryError::TypeMismatch {
                    predicate,
                    found: query.kind(),
                })?;
                match predicate {
                    Predicate::Contains => Matcher::AllTokens(tokenize_query(text)),
                    Predicate::ContainsPrefix => Matcher::TokenPrefix(fold_case(text)),
                    Predicate::ContainsRegex => Matcher::TokenPattern(self.anchored(text)?),
                    Predicate::Prefix => Matcher::Prefix(fold_case(text)),
                    Predicate::Regex => Matcher::Pattern(self.anchored(text)?),
                    Predicate::Equal | Predicate::NotEqual => Matcher::Equal,
                }
            }
        };
        Ok(Condition {
            predicate,
            value: query,
            matcher,
        })
    }

    /// Compile `pattern` so that it only matches a whole input.
    fn anchored(&self, pattern: &str) -> Result<Regex, QueryError> {
        let invalid = |err: regex::Error| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        };
        // Validate the bare pattern first: wrapping can paper over stray parens.
        Regex::new(pattern).map_err(invalid)?;
        RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(self.regex_case == RegexCase::Insensitive)
            .build()
            .map_err(invalid)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Equal,
    NotEqual,
    AllTokens(Vec<String>),
    TokenPrefix(String),
    TokenPattern(Regex),
    Prefix(String),
    Pattern(Regex),
}

/// A predicate bound to its pre-processed query value.
#[derive(Debug, Clone)]
pub struct Condition {
    predicate: Predicate,
    value: Value,
    matcher: Matcher,
}

impl Condition {
    pub fn predicate(&self) -> Predicate {
        self.predicate
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Test a stored value. `Null` never satisfies a text predicate.
    pub fn test(&self, stored: &Value) -> Result<bool, QueryError> {
        let text = match &self.matcher {
            Matcher::Equal => return Ok(*stored == self.value),
            Matcher::NotEqual => return Ok(*stored != self.value),
            _ => match stored {
                Value::String(s) => s.as_str(),
                Value::Null => return Ok(false),
                other => {
                    return Err(QueryError::TypeMismatch {
                        predicate: self.predicate,
                        found: other.kind(),
                    })
                }
            },
        };

        let matched = match &self.matcher {
            Matcher::AllTokens(query_tokens) => {
                if query_tokens.is_empty() {
                    false
                } else {
                    let tokens = tokenize(text);
                    query_tokens.iter().all(|q| tokens.contains(q))
                }
            }
            Matcher::TokenPrefix(prefix) => tokenize(text).iter().any(|t| t.starts_with(prefix)),
            Matcher::TokenPattern(re) => tokenize(text).iter().any(|t| re.is_match(t)),
            Matcher::Prefix(prefix) => fold_case(text).starts_with(prefix.as_str()),
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Equal | Matcher::NotEqual => false,
        };
        Ok(matched)
    }

    /// Outcome for a relation that does not carry the clause key at all.
    pub fn test_missing(&self) -> bool {
        self.predicate == Predicate::NotEqual
    }
}
