//! Model capability descriptors.
//!
//! A [`Capability`] is the per-model static metadata every query call
//! consults: declared fields with their semantic types, the primary key
//! schema, secondary indexes in declaration order, and whether the backend
//! honors ordering operators on range keys. Built once at model
//! registration, immutable and freely shared afterwards.

use garnet_types::SemanticType;
use thiserror::Error;

use crate::error::{QueryError, Result};

// ============================================================================
// Indexes
// ============================================================================

/// Secondary index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Shares the table's partition key with an alternate sort key.
    Local,
    /// Carries its own partition key.
    Global,
}

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    name: String,
    partition_key: String,
    sort_key: Option<String>,
    kind: IndexKind,
}

impl IndexDef {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partition key field.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Sort key field, if the index has one.
    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Local or global.
    pub fn kind(&self) -> IndexKind {
        self.kind
    }
}

// ============================================================================
// Capability Descriptor
// ============================================================================

/// Per-model static metadata shared by every query call.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    model: String,
    fields: Vec<(String, SemanticType)>,
    hash_key: String,
    range_key: Option<String>,
    indexes: Vec<IndexDef>,
    range_conditions: bool,
}

impl Capability {
    /// Starts building a descriptor for the named model.
    pub fn builder(model: impl Into<String>) -> CapabilityBuilder {
        CapabilityBuilder {
            model: model.into(),
            fields: Vec::new(),
            hash_key: None,
            range_key: None,
            indexes: Vec::new(),
            range_conditions: true,
        }
    }

    /// Model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, SemanticType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// A field's semantic type, if declared.
    pub fn field_type(&self, field: &str) -> Option<SemanticType> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, ty)| *ty)
    }

    /// A field's semantic type, or [`QueryError::UndeclaredField`].
    pub fn field_type_or_err(&self, field: &str) -> Result<SemanticType> {
        self.field_type(field)
            .ok_or_else(|| QueryError::UndeclaredField {
                model: self.model.clone(),
                field: field.to_string(),
            })
    }

    /// The table's hash (partition) key field.
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    /// The table's range (sort) key field, if declared.
    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    /// Declared secondary indexes in declaration order.
    ///
    /// Declaration order is the planner's final tie-break.
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|idx| idx.name() == name)
    }

    /// Looks up an index by name, or [`QueryError::UnknownIndex`].
    pub fn index_or_err(&self, name: &str) -> Result<&IndexDef> {
        self.index(name).ok_or_else(|| QueryError::UnknownIndex {
            model: self.model.clone(),
            index: name.to_string(),
        })
    }

    /// Whether ordering operators are usable on range keys in key
    /// conditions. When false, only equality reaches a range key.
    pub fn supports_range_conditions(&self) -> bool {
        self.range_conditions
    }

    /// The base table's key fields: hash key, then range key if declared.
    pub fn key_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.hash_key.as_str()];
        if let Some(range) = self.range_key.as_deref() {
            fields.push(range);
        }
        fields
    }

    /// The ordering/resume columns for a plan target: the index's keys (if
    /// any) followed by the base keys, deduplicated left to right.
    ///
    /// Backends order result sets by exactly this column tuple and
    /// continuation tokens carry exactly these fields, which is what makes
    /// token resume strict and duplicate-free.
    pub fn resume_fields(&self, index: Option<&IndexDef>) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
        };
        if let Some(idx) = index {
            push(idx.partition_key());
            if let Some(sort) = idx.sort_key() {
                push(sort);
            }
        }
        push(&self.hash_key);
        if let Some(range) = self.range_key.as_deref() {
            push(range);
        }
        fields
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Capability`]; validates the descriptor on `build`.
#[derive(Debug, Clone)]
pub struct CapabilityBuilder {
    model: String,
    fields: Vec<(String, SemanticType)>,
    hash_key: Option<String>,
    range_key: Option<String>,
    indexes: Vec<IndexDef>,
    range_conditions: bool,
}

impl CapabilityBuilder {
    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, semantic: SemanticType) -> Self {
        self.fields.push((name.into(), semantic));
        self
    }

    /// Sets the hash (partition) key field.
    #[must_use]
    pub fn hash_key(mut self, field: impl Into<String>) -> Self {
        self.hash_key = Some(field.into());
        self
    }

    /// Sets the range (sort) key field.
    #[must_use]
    pub fn range_key(mut self, field: impl Into<String>) -> Self {
        self.range_key = Some(field.into());
        self
    }

    /// Declares a local secondary index: the table's partition key with an
    /// alternate sort key.
    #[must_use]
    pub fn local_index(mut self, name: impl Into<String>, sort_key: impl Into<String>) -> Self {
        self.indexes.push(IndexDef {
            name: name.into(),
            // Resolved against the hash key at build time
            partition_key: String::new(),
            sort_key: Some(sort_key.into()),
            kind: IndexKind::Local,
        });
        self
    }

    /// Declares a global secondary index with its own partition key and
    /// optional sort key.
    #[must_use]
    pub fn global_index(
        mut self,
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: Option<&str>,
    ) -> Self {
        self.indexes.push(IndexDef {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: sort_key.map(ToString::to_string),
            kind: IndexKind::Global,
        });
        self
    }

    /// Sets whether the backend honors ordering operators on range keys in
    /// key conditions. Defaults to true.
    #[must_use]
    pub fn range_conditions(mut self, enabled: bool) -> Self {
        self.range_conditions = enabled;
        self
    }

    /// Validates and freezes the descriptor.
    ///
    /// # Errors
    ///
    /// Rejects duplicate fields and index names, key fields that are
    /// undeclared or whose semantic type has no key order (boolean, JSON),
    /// and a missing hash key.
    pub fn build(self) -> std::result::Result<Capability, CapabilityError> {
        for (i, (name, _)) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|(other, _)| other == name) {
                return Err(CapabilityError::DuplicateField {
                    model: self.model,
                    field: name.clone(),
                });
            }
        }

        let Some(hash_key) = self.hash_key else {
            return Err(CapabilityError::MissingHashKey { model: self.model });
        };
        check_key_field(&self.model, &self.fields, &hash_key)?;
        if let Some(range) = self.range_key.as_deref() {
            check_key_field(&self.model, &self.fields, range)?;
        }

        let mut indexes = self.indexes;
        for i in 0..indexes.len() {
            if indexes[..i].iter().any(|other| other.name == indexes[i].name) {
                return Err(CapabilityError::DuplicateIndex {
                    model: self.model,
                    index: indexes[i].name.clone(),
                });
            }
            if indexes[i].kind == IndexKind::Local {
                indexes[i].partition_key = hash_key.clone();
            }
            check_key_field(&self.model, &self.fields, &indexes[i].partition_key)?;
            if let Some(sort) = indexes[i].sort_key.as_deref() {
                check_key_field(&self.model, &self.fields, sort)?;
            }
        }

        Ok(Capability {
            model: self.model,
            fields: self.fields,
            hash_key,
            range_key: self.range_key,
            indexes,
            range_conditions: self.range_conditions,
        })
    }
}

/// Checks that a key field is declared and has a usable key order.
fn check_key_field(
    model: &str,
    fields: &[(String, SemanticType)],
    field: &str,
) -> std::result::Result<(), CapabilityError> {
    let Some((_, semantic)) = fields.iter().find(|(name, _)| name == field) else {
        return Err(CapabilityError::UndeclaredKeyField {
            model: model.to_string(),
            field: field.to_string(),
        });
    };
    if !semantic.is_key_compatible() {
        return Err(CapabilityError::KeyTypeUnsupported {
            model: model.to_string(),
            field: field.to_string(),
            semantic: *semantic,
        });
    }
    Ok(())
}

/// Descriptor construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// No hash key was declared.
    #[error("model `{model}` declares no hash key")]
    MissingHashKey {
        /// Model name.
        model: String,
    },

    /// The same field was declared twice.
    #[error("model `{model}` declares field `{field}` more than once")]
    DuplicateField {
        /// Model name.
        model: String,
        /// The duplicated field.
        field: String,
    },

    /// A key or index referenced an undeclared field.
    #[error("key field `{field}` is not declared on model `{model}`")]
    UndeclaredKeyField {
        /// Model name.
        model: String,
        /// The undeclared field.
        field: String,
    },

    /// A key field's semantic type has no usable key order.
    #[error("field `{field}` of type {semantic} cannot be a key on model `{model}`")]
    KeyTypeUnsupported {
        /// Model name.
        model: String,
        /// The offending field.
        field: String,
        /// Its declared semantic type.
        semantic: SemanticType,
    },

    /// Two indexes share a name.
    #[error("model `{model}` declares index `{index}` more than once")]
    DuplicateIndex {
        /// Model name.
        model: String,
        /// The duplicated index name.
        index: String,
    },
}
