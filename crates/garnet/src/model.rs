//! The model codec contract and the key forms that address records.

use garnet_query::Capability;
use garnet_types::{Record, RecordError, Value};

/// The codec contract a stored type implements.
///
/// Encoding and decoding must be total and lossless for declared fields:
/// decoding an encoded instance yields an equal instance. Optional fields
/// may be omitted from the record; absent and null mean the same thing
/// everywhere in the query path.
pub trait Model: Sized {
    /// Declared fields, base key, and indexes of this model.
    ///
    /// Called once when a [`Store`](crate::Store) is opened; the store
    /// caches the descriptor for the rest of its life.
    fn capability() -> Capability;

    /// Encodes this instance as a flat record of declared fields.
    fn to_record(&self) -> Result<Record, RecordError>;

    /// Decodes an instance from a stored record.
    fn from_record(record: &Record) -> Result<Self, RecordError>;
}

/// How a call names the record it wants.
///
/// The hash and hash-plus-range forms address the base key directly. The
/// field-mapping form may name either the base key fields or the key
/// field(s) of a declared index; anything else is rejected with
/// [`Error::InvalidKey`](crate::Error::InvalidKey).
#[derive(Debug, Clone, PartialEq)]
pub enum ModelKey {
    /// The bare hash-key value, for models without a range key.
    Hash(Value),
    /// Hash and range key values.
    HashRange(Value, Value),
    /// An explicit field-to-value mapping.
    Fields(Record),
}

impl From<Value> for ModelKey {
    fn from(value: Value) -> Self {
        ModelKey::Hash(value)
    }
}

impl From<i64> for ModelKey {
    fn from(value: i64) -> Self {
        ModelKey::Hash(Value::Integer(value))
    }
}

impl From<&str> for ModelKey {
    fn from(value: &str) -> Self {
        ModelKey::Hash(Value::Text(value.to_string()))
    }
}

impl From<String> for ModelKey {
    fn from(value: String) -> Self {
        ModelKey::Hash(Value::Text(value))
    }
}

impl<H: Into<Value>, R: Into<Value>> From<(H, R)> for ModelKey {
    fn from((hash, range): (H, R)) -> Self {
        ModelKey::HashRange(hash.into(), range.into())
    }
}

impl From<Record> for ModelKey {
    fn from(fields: Record) -> Self {
        ModelKey::Fields(fields)
    }
}
