//! Literal and stored-value normalization.
//!
//! Every executor shares one coercion table: direct [`Rule::eval`], the
//! key/value renderer, and the SQL renderer all normalize operands through
//! this module before comparing. Keeping the table in one place is what
//! makes the flavors agree record-for-record.
//!
//! Canonical forms per semantic type:
//!
//! | Semantic    | Canonical variant | Widened from                    |
//! |-------------|-------------------|---------------------------------|
//! | `Integer`   | `Integer`         |                                 |
//! | `Double`    | `Double` (finite) | `Integer`                       |
//! | `Decimal`   | `Decimal` (normalized) | `Integer`, `Text`          |
//! | `Boolean`   | `Boolean`         |                                 |
//! | `Text`      | `Text`            |                                 |
//! | `DateTime`  | `DateTime`        | `Text` (RFC 3339)               |
//! | `Timestamp` | `Integer` (epoch seconds) | `DateTime`              |
//! | `Json`      | `Json`            |                                 |
//!
//! `Null` passes through unchanged for every semantic: a null literal is
//! the presence test, not a typed value.
//!
//! [`Rule::eval`]: crate::Rule::eval

use chrono::{DateTime, Utc};
use garnet_types::{SemanticType, Value};
use rust_decimal::Decimal;

use crate::error::{QueryError, Result};
use crate::rule::CompareOp;

/// Normalizes a value to the canonical variant for `semantic`.
///
/// Returns `None` when the value cannot represent the semantic type, for
/// example a boolean against a `Decimal` field or a non-finite double.
pub(crate) fn normalize(semantic: SemanticType, value: &Value) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match semantic {
        SemanticType::Integer => match value {
            Value::Integer(n) => Some(Value::Integer(*n)),
            _ => None,
        },
        SemanticType::Double => match value {
            Value::Double(f) if f.is_finite() => Some(Value::Double(*f)),
            Value::Integer(n) => Some(Value::Double(*n as f64)),
            _ => None,
        },
        SemanticType::Decimal => match value {
            Value::Decimal(d) => Some(Value::Decimal(d.normalize())),
            Value::Integer(n) => Some(Value::Decimal(Decimal::from(*n))),
            Value::Text(s) => s.parse::<Decimal>().ok().map(|d| Value::Decimal(d.normalize())),
            _ => None,
        },
        SemanticType::Boolean => match value {
            Value::Boolean(b) => Some(Value::Boolean(*b)),
            _ => None,
        },
        SemanticType::Text => match value {
            Value::Text(s) => Some(Value::Text(s.clone())),
            _ => None,
        },
        SemanticType::DateTime => match value {
            Value::DateTime(dt) => Some(Value::DateTime(*dt)),
            Value::Text(s) => parse_rfc3339(s).map(Value::DateTime),
            _ => None,
        },
        // Expiry timestamps live as epoch seconds everywhere they are
        // stored or compared.
        SemanticType::Timestamp => match value {
            Value::Integer(n) => Some(Value::Integer(*n)),
            Value::DateTime(dt) => Some(Value::Integer(dt.timestamp())),
            _ => None,
        },
        SemanticType::Json => match value {
            Value::Json(j) => Some(Value::Json(j.clone())),
            _ => None,
        },
    }
}

/// Normalizes a rule literal against the field's declared type.
///
/// # Errors
///
/// [`QueryError::Coercion`] naming the field and the rejected value.
pub(crate) fn literal(field: &str, semantic: SemanticType, value: &Value) -> Result<Value> {
    normalize(semantic, value).ok_or_else(|| QueryError::coercion(field, value, semantic))
}

/// Normalizes a stored field value before comparison.
///
/// Stored values re-enter through deserialized continuation tokens and
/// backend reads, where strings stand in for dates and decimals; this is
/// where they regain their semantic variant. A value that cannot be
/// normalized is treated as absent rather than failing the whole query,
/// so rows written outside this library degrade to non-matches.
pub(crate) fn stored(semantic: SemanticType, value: &Value) -> Option<Value> {
    normalize(semantic, value).filter(|v| !v.is_null())
}

/// Validates an operator/literal pairing before rendering or evaluating.
///
/// # Errors
///
/// [`QueryError::Coercion`] when an ordering operator is applied to a
/// null literal; null supports only the `=`/`!=` presence tests.
pub(crate) fn check_comparison(
    field: &str,
    op: CompareOp,
    literal: &Value,
    semantic: SemanticType,
) -> Result<()> {
    if op.is_ordering() && literal.is_null() {
        return Err(QueryError::coercion(field, literal, semantic));
    }
    Ok(())
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
