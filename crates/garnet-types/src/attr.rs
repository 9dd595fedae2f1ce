//! Attribute wire format for the key-value backend.
//!
//! Mirrors the DynamoDB attribute-value shape: numbers are decimal strings
//! under `"N"`, text under `"S"`, booleans under `"BOOL"`, null as
//! `{"NULL": true}`, and nested documents under `"M"`/`"L"`. Numeric
//! comparison is exact decimal comparison of the `N` string, never string
//! comparison.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SemanticType, Value, format_datetime};

/// A key-value store attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Number, carried as its decimal string form.
    #[serde(rename = "N")]
    N(String),
    /// UTF-8 text.
    #[serde(rename = "S")]
    S(String),
    /// Boolean.
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Null marker; the payload is always `true` on the wire.
    #[serde(rename = "NULL")]
    Null(bool),
    /// Nested mapping.
    #[serde(rename = "M")]
    M(BTreeMap<String, AttrValue>),
    /// Nested list.
    #[serde(rename = "L")]
    L(Vec<AttrValue>),
}

/// Attribute conversion failures.
///
/// Higher layers wrap these in coercion errors that add the field name;
/// this type only knows about values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttrError {
    /// The value's shape does not fit the declared semantic type.
    #[error("cannot represent {got} as {expected}")]
    Unsupported {
        /// Declared semantic type.
        expected: SemanticType,
        /// Short description of the offending value.
        got: String,
    },

    /// A non-finite double was supplied; neither backend can carry it.
    #[error("non-finite double {0} has no wire representation")]
    NonFinite(f64),

    /// A stored wire value failed to parse back into the semantic type.
    #[error("stored value `{input}` does not parse as {expected}")]
    Parse {
        /// Declared semantic type.
        expected: SemanticType,
        /// The wire text that failed to parse.
        input: String,
    },
}

impl AttrValue {
    /// The null attribute.
    pub fn null() -> Self {
        AttrValue::Null(true)
    }

    /// Returns true if this attribute is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null(_))
    }

    /// Short tag name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::N(_) => "N",
            AttrValue::S(_) => "S",
            AttrValue::Bool(_) => "BOOL",
            AttrValue::Null(_) => "NULL",
            AttrValue::M(_) => "M",
            AttrValue::L(_) => "L",
        }
    }

    /// Lowers a runtime value onto the wire per its field's semantic type.
    ///
    /// Null is representable for every type. The only widenings are the
    /// natural ones: integers into double, decimal, and timestamp fields,
    /// and date-times into timestamp (whole-second epoch) fields.
    ///
    /// # Errors
    ///
    /// [`AttrError::Unsupported`] when the value's shape does not fit, and
    /// [`AttrError::NonFinite`] for NaN or infinite doubles.
    pub fn from_value(value: &Value, semantic: SemanticType) -> Result<Self, AttrError> {
        let unsupported = || AttrError::Unsupported {
            expected: semantic,
            got: value_shape(value),
        };

        if value.is_null() {
            return Ok(AttrValue::null());
        }

        match semantic {
            SemanticType::Integer => match value {
                Value::Integer(v) => Ok(AttrValue::N(v.to_string())),
                _ => Err(unsupported()),
            },
            SemanticType::Double => match value {
                Value::Double(v) => {
                    if v.is_finite() {
                        Ok(AttrValue::N(v.to_string()))
                    } else {
                        Err(AttrError::NonFinite(*v))
                    }
                }
                Value::Integer(v) => Ok(AttrValue::N(v.to_string())),
                _ => Err(unsupported()),
            },
            SemanticType::Decimal => match value {
                Value::Decimal(v) => Ok(AttrValue::N(v.normalize().to_string())),
                Value::Integer(v) => Ok(AttrValue::N(v.to_string())),
                _ => Err(unsupported()),
            },
            SemanticType::Boolean => match value {
                Value::Boolean(v) => Ok(AttrValue::Bool(*v)),
                _ => Err(unsupported()),
            },
            SemanticType::Text => match value {
                Value::Text(v) => Ok(AttrValue::S(v.clone())),
                _ => Err(unsupported()),
            },
            SemanticType::DateTime => match value {
                Value::DateTime(v) => Ok(AttrValue::S(format_datetime(v))),
                _ => Err(unsupported()),
            },
            SemanticType::Timestamp => match value {
                Value::DateTime(v) => Ok(AttrValue::N(v.timestamp().to_string())),
                Value::Integer(v) => Ok(AttrValue::N(v.to_string())),
                _ => Err(unsupported()),
            },
            SemanticType::Json => match value {
                Value::Json(v) => Ok(json_to_attr(v)),
                _ => Err(unsupported()),
            },
        }
    }

    /// Raises a wire attribute back into a runtime value.
    ///
    /// Timestamp fields come back as [`Value::Integer`] epoch seconds, the
    /// canonical carried form of a TTL field. The date-time widening in
    /// [`AttrValue::from_value`] is one-way.
    ///
    /// # Errors
    ///
    /// [`AttrError::Parse`] when the stored text does not parse, and
    /// [`AttrError::Unsupported`] when the wire tag contradicts the
    /// declared semantic type.
    pub fn to_value(&self, semantic: SemanticType) -> Result<Value, AttrError> {
        let unsupported = || AttrError::Unsupported {
            expected: semantic,
            got: format!("wire attribute {}", self.kind()),
        };
        let parse_err = |input: &str| AttrError::Parse {
            expected: semantic,
            input: input.to_string(),
        };

        if self.is_null() {
            return Ok(Value::Null);
        }

        match (semantic, self) {
            (SemanticType::Integer, AttrValue::N(s)) => {
                s.parse::<i64>().map(Value::Integer).map_err(|_| parse_err(s))
            }
            (SemanticType::Double, AttrValue::N(s)) => {
                s.parse::<f64>().map(Value::Double).map_err(|_| parse_err(s))
            }
            (SemanticType::Decimal, AttrValue::N(s)) => Decimal::from_str(s)
                .map(Value::Decimal)
                .map_err(|_| parse_err(s)),
            (SemanticType::Boolean, AttrValue::Bool(b)) => Ok(Value::Boolean(*b)),
            (SemanticType::Text, AttrValue::S(s)) => Ok(Value::Text(s.clone())),
            (SemanticType::DateTime, AttrValue::S(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| parse_err(s)),
            (SemanticType::Timestamp, AttrValue::N(s)) => {
                s.parse::<i64>().map(Value::Integer).map_err(|_| parse_err(s))
            }
            (SemanticType::Json, attr @ (AttrValue::M(_) | AttrValue::L(_))) => {
                Ok(Value::Json(attr_to_json(attr)?))
            }
            _ => Err(unsupported()),
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::N(s) | AttrValue::S(s) => write!(f, "{s}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Null(_) => write!(f, "NULL"),
            attr @ (AttrValue::M(_) | AttrValue::L(_)) => match attr_to_json(attr) {
                Ok(json) => write!(f, "{json}"),
                Err(_) => write!(f, "<{}>", attr.kind()),
            },
        }
    }
}

/// Lowers an arbitrary JSON document into nested attributes.
fn json_to_attr(json: &serde_json::Value) -> AttrValue {
    match json {
        serde_json::Value::Null => AttrValue::null(),
        serde_json::Value::Bool(b) => AttrValue::Bool(*b),
        serde_json::Value::Number(n) => AttrValue::N(n.to_string()),
        serde_json::Value::String(s) => AttrValue::S(s.clone()),
        serde_json::Value::Array(items) => AttrValue::L(items.iter().map(json_to_attr).collect()),
        serde_json::Value::Object(map) => AttrValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attr(v)))
                .collect(),
        ),
    }
}

/// Raises nested attributes back into a JSON document.
fn attr_to_json(attr: &AttrValue) -> Result<serde_json::Value, AttrError> {
    Ok(match attr {
        AttrValue::Null(_) => serde_json::Value::Null,
        AttrValue::Bool(b) => serde_json::Value::Bool(*b),
        AttrValue::S(s) => serde_json::Value::String(s.clone()),
        AttrValue::N(s) => {
            if let Ok(i) = s.parse::<i64>() {
                serde_json::Value::Number(i.into())
            } else {
                let f = s.parse::<f64>().map_err(|_| AttrError::Parse {
                    expected: SemanticType::Json,
                    input: s.clone(),
                })?;
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| AttrError::Parse {
                        expected: SemanticType::Json,
                        input: s.clone(),
                    })?
            }
        }
        AttrValue::L(items) => {
            serde_json::Value::Array(items.iter().map(attr_to_json).collect::<Result<_, _>>()?)
        }
        AttrValue::M(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), attr_to_json(v)?)))
                .collect::<Result<_, AttrError>>()?,
        ),
    })
}

/// One-line description of a value's shape for error messages.
fn value_shape(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(v) => format!("integer {v}"),
        Value::Double(v) => format!("double {v}"),
        Value::Boolean(v) => format!("boolean {v}"),
        Value::Text(v) => format!("text `{v}`"),
        Value::Decimal(v) => format!("decimal {v}"),
        Value::DateTime(v) => format!("datetime {}", format_datetime(v)),
        Value::Json(_) => "json document".to_string(),
    }
}
