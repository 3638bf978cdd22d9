//! Executor configuration.
//!
//! Sources, later ones overriding earlier ones: [`ExecutorConfig::default`],
//! a JSON document ([`ExecutorConfig::from_json_str`]), then environment
//! variables ([`ExecutorConfig::apply_env`]).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ENV_PARALLEL_THRESHOLD: &str = "MULTIQUERY_PARALLEL_THRESHOLD";
pub const ENV_BATCH_LOOKUP: &str = "MULTIQUERY_BATCH_LOOKUP";
pub const ENV_ID_FAST_PATH: &str = "MULTIQUERY_ID_FAST_PATH";
pub const ENV_REGEX_CASE: &str = "MULTIQUERY_REGEX_CASE";

/// Case handling for `REGEX` and `CONTAINS_REGEX`.
///
/// `CONTAINS_REGEX` always matches against case-folded tokens; this setting
/// only controls how the pattern itself treats case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegexCase {
    #[default]
    Sensitive,
    Insensitive,
}

impl FromStr for RegexCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sensitive" => Ok(RegexCase::Sensitive),
            "insensitive" => Ok(RegexCase::Insensitive),
            other => Err(format!(
                "unknown regex case `{other}` (expected sensitive or insensitive)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Anchor sets at least this large are fanned out over the rayon pool.
    pub parallel_threshold: usize,
    /// Use the backend's bulk lookup when it advertises one.
    pub batch_lookup: bool,
    /// Serve `vertex_ids()` from identifier-only adjacency when the query
    /// needs no attribute payload.
    pub id_fast_path: bool,
    pub regex_case: RegexCase,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 8,
            batch_lookup: true,
            id_fast_path: true,
            regex_case: RegexCase::Sensitive,
        }
    }
}

impl ExecutorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Override fields from environment-style lookups. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, ENV_PARALLEL_THRESHOLD) {
            self.parallel_threshold = v;
        }
        if let Some(v) = lookup(ENV_BATCH_LOOKUP).and_then(|raw| parse_flag(ENV_BATCH_LOOKUP, &raw)) {
            self.batch_lookup = v;
        }
        if let Some(v) = lookup(ENV_ID_FAST_PATH).and_then(|raw| parse_flag(ENV_ID_FAST_PATH, &raw)) {
            self.id_fast_path = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_REGEX_CASE) {
            self.regex_case = v;
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(variable = key, value = %raw, error = %err, "ignoring invalid configuration value");
            None
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(variable = key, value = %raw, "ignoring invalid configuration flag");
            None
        }
    }
}
