//! Conversion between runtime records and SQLite storage classes.
//!
//! Writes go through the query layer's storage lowering, so a value
//! lands in its column exactly as the renderer's bind parameters expect
//! to find it: decimals as normalized text, datetimes as fixed-width
//! UTC text, booleans and epoch timestamps as integers, documents as
//! canonical JSON text. Reads reverse that mapping per declared
//! semantic type; a SQL NULL raises to an absent field.

use std::str;

use chrono::{DateTime, Utc};
use garnet_query::sql::{self, SqlParam};
use garnet_query::Capability;
use garnet_types::{BackendError, Record, SemanticType, Value};
use rusqlite::types::ValueRef;

/// Maps a rendered bind parameter onto rusqlite's owned value.
pub(crate) fn bind_value(param: &SqlParam) -> rusqlite::types::Value {
    match param {
        SqlParam::Null => rusqlite::types::Value::Null,
        SqlParam::Integer(i) => rusqlite::types::Value::Integer(*i),
        SqlParam::Real(f) => rusqlite::types::Value::Real(*f),
        SqlParam::Text(text) => rusqlite::types::Value::Text(text.clone()),
    }
}

/// Lowers a record into one bind parameter per declared column, in
/// declaration order. Absent and null fields bind SQL NULL.
pub(crate) fn write_params(
    capability: &Capability,
    record: &Record,
) -> Result<Vec<SqlParam>, BackendError> {
    for (field, _) in record.iter() {
        if capability.field_type(field).is_none() {
            return Err(BackendError::msg(format!(
                "field `{field}` is not declared on model `{}`",
                capability.model()
            )));
        }
    }
    let mut params = Vec::new();
    for (field, semantic) in capability.fields() {
        match record.get(field) {
            None | Some(Value::Null) => params.push(SqlParam::Null),
            Some(value) => {
                params.push(sql::store_param(field, value, semantic).map_err(BackendError::new)?);
            }
        }
    }
    Ok(params)
}

/// Lowers the base-key fields of a record, erroring when any is absent
/// or null.
pub(crate) fn key_params(
    capability: &Capability,
    key: &Record,
) -> Result<Vec<SqlParam>, BackendError> {
    capability
        .key_fields()
        .iter()
        .map(|field| {
            let value = key
                .get(field)
                .filter(|value| !value.is_null())
                .ok_or_else(|| {
                    BackendError::msg(format!("record is missing key field `{field}`"))
                })?;
            let semantic = capability.field_type(field).ok_or_else(|| {
                BackendError::msg(format!("key field `{field}` is not declared"))
            })?;
            sql::store_param(field, value, semantic).map_err(BackendError::new)
        })
        .collect()
}

/// Raises one result row, whose columns are the declared fields in
/// declaration order, back into a record.
pub(crate) fn read_record(
    row: &rusqlite::Row<'_>,
    capability: &Capability,
) -> Result<Record, BackendError> {
    let mut record = Record::new();
    for (i, (field, semantic)) in capability.fields().enumerate() {
        let stored = row.get_ref(i).map_err(BackendError::new)?;
        if let Some(value) = decode(field, semantic, stored)? {
            record.set(field, value);
        }
    }
    Ok(record)
}

fn decode(
    field: &str,
    semantic: SemanticType,
    stored: ValueRef<'_>,
) -> Result<Option<Value>, BackendError> {
    let value = match (semantic, stored) {
        (_, ValueRef::Null) => return Ok(None),
        (SemanticType::Integer | SemanticType::Timestamp, ValueRef::Integer(i)) => {
            Value::Integer(i)
        }
        (SemanticType::Boolean, ValueRef::Integer(i)) => Value::Boolean(i != 0),
        (SemanticType::Double, ValueRef::Real(f)) => Value::Double(f),
        // SQLite may hand back integer-valued reals with INTEGER storage.
        (SemanticType::Double, ValueRef::Integer(i)) => Value::Double(i as f64),
        (SemanticType::Decimal, ValueRef::Text(text)) => {
            let text = str::from_utf8(text).map_err(BackendError::new)?;
            Value::Decimal(text.parse().map_err(BackendError::new)?)
        }
        (SemanticType::Text, ValueRef::Text(text)) => {
            Value::Text(str::from_utf8(text).map_err(BackendError::new)?.to_string())
        }
        (SemanticType::DateTime, ValueRef::Text(text)) => {
            let text = str::from_utf8(text).map_err(BackendError::new)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(BackendError::new)?;
            Value::DateTime(parsed.with_timezone(&Utc))
        }
        (SemanticType::Json, ValueRef::Text(text)) => {
            let text = str::from_utf8(text).map_err(BackendError::new)?;
            Value::Json(serde_json::from_str(text).map_err(BackendError::new)?)
        }
        (semantic, stored) => {
            return Err(BackendError::msg(format!(
                "column `{field}` holds {} where {semantic} was expected",
                stored.data_type()
            )));
        }
    };
    Ok(Some(value))
}
