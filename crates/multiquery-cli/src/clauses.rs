//! Parsing of clause flags (`--has`, `--interval`, `--order`, ...).

use anyhow::{anyhow, bail, Result};
use multiquery_core::{Order, Predicate, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct HasArg {
    pub key: String,
    pub predicate: Predicate,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalArg {
    pub key: String,
    pub start: Value,
    pub end: Value,
}

/// `KEY[:PREDICATE]=VALUE`. Text predicates keep the value verbatim; the
/// comparison predicates parse it as a literal.
pub fn parse_has(raw: &str) -> Result<HasArg> {
    let (lhs, value) = split_assignment(raw)?;
    let (key, predicate) = match lhs.split_once(':') {
        Some((key, predicate)) => (key, predicate.parse::<Predicate>().map_err(|e| anyhow!(e))?),
        None => (lhs, Predicate::Equal),
    };
    let value = if predicate.is_text() {
        Value::String(value.to_string())
    } else {
        Value::parse_literal(value)
    };
    Ok(HasArg {
        key: non_empty_key(key, raw)?,
        predicate,
        value,
    })
}

/// `KEY=VALUE`, negated.
pub fn parse_has_not(raw: &str) -> Result<HasArg> {
    let (key, value) = split_assignment(raw)?;
    Ok(HasArg {
        key: non_empty_key(key, raw)?,
        predicate: Predicate::NotEqual,
        value: Value::parse_literal(value),
    })
}

/// `KEY=START..END`, half-open.
pub fn parse_interval(raw: &str) -> Result<IntervalArg> {
    let (key, range) = split_assignment(raw)?;
    let (start, end) = range
        .split_once("..")
        .ok_or_else(|| anyhow!("interval `{raw}` must look like KEY=START..END"))?;
    Ok(IntervalArg {
        key: non_empty_key(key, raw)?,
        start: Value::parse_literal(start),
        end: Value::parse_literal(end),
    })
}

/// `KEY[:asc|desc]`, ascending by default.
pub fn parse_order(raw: &str) -> Result<(String, Order)> {
    let (key, order) = match raw.split_once(':') {
        Some((key, order)) => (key, order.parse::<Order>().map_err(|e| anyhow!(e))?),
        None => (raw, Order::Asc),
    };
    Ok((non_empty_key(key, raw)?, order))
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| anyhow!("`{raw}` must look like KEY=VALUE"))
}

fn non_empty_key(key: &str, raw: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        bail!("missing key in `{raw}`");
    }
    Ok(key.to_string())
}
