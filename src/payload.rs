//! Request payload handling for the transport layer.
//!
//! The engine stores values as opaque strings. Everything that reaches it has
//! been parsed as JSON and re-serialized compactly here first.
//!
//! Every number is read as a double, the way browsers read them, so `1.0`,
//! `1e0` and `1` all store as `1`. Integers beyond 2^53 lose precision.
//! Object keys come out sorted; string contents are untouched.

use crate::error::{KvError, Result};
use serde_json::{Number, Value};

/// Largest magnitude below which every integer is exact as a double.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Parse `body` as JSON and return its compact serialization.
pub fn canonicalize(body: &[u8]) -> Result<String> {
    let mut value: Value = serde_json::from_slice(body)?;
    normalize_numbers(&mut value);
    Ok(serde_json::to_string(&value)?)
}

fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if let Some(normalized) = n.as_f64().and_then(number_from_f64) {
                *n = normalized;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(fields) => fields.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

fn number_from_f64(f: f64) -> Option<Number> {
    if f.fract() == 0.0 && f.abs() < EXACT_INTEGER_LIMIT {
        Some(Number::from(f as i64))
    } else {
        Number::from_f64(f)
    }
}

/// Parse the expected revision a conditional write carries.
///
/// Negative values parse fine; they can never match and end up as conflicts.
pub fn parse_revision_hint(hint: Option<&str>) -> Result<i64> {
    let hint = hint.ok_or(KvError::MissingRevision)?;
    if hint.is_empty() {
        return Err(KvError::MissingRevision);
    }
    hint.trim()
        .parse::<i64>()
        .map_err(|_| KvError::InvalidRevision(hint.to_string()))
}
