//! The typed store facade: one model, one backend, every operation.

use std::collections::BTreeSet;
use std::marker::PhantomData;

use garnet_config::{BackendKind, GarnetConfig};
use garnet_kv::MemoryKv;
use garnet_query::{Backend, Capability, IndexDef, PutOutcome, Rule, compile_guard};
use garnet_sqlite::SqliteBackend;
use garnet_types::Record;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Model, ModelKey};
use crate::query::Query;

// ============================================================================
// Backend selection
// ============================================================================

/// Builds the backend a configuration names.
///
/// The choice happens once, here. Everything downstream holds a
/// `Box<dyn Backend>` and never branches on the kind again.
pub fn open_backend(config: &GarnetConfig) -> Result<Box<dyn Backend>> {
    debug!(kind = ?config.backend.kind, "opening backend");
    match config.backend.kind {
        BackendKind::Memory => Ok(Box::new(MemoryKv::new())),
        BackendKind::Sqlite => Ok(Box::new(SqliteBackend::open(&config.sqlite.path)?)),
    }
}

// ============================================================================
// Store
// ============================================================================

/// A typed store for one model over one backend.
///
/// The store owns the backend handle and the model's cached
/// [`Capability`]; every call runs against that pair. Reads decode
/// through [`Model::from_record`] and writes encode through
/// [`Model::to_record`], so callers only ever see instances of `M`.
pub struct Store<M: Model> {
    backend: Box<dyn Backend>,
    capability: Capability,
    _model: PhantomData<M>,
}

/// Where a [`ModelKey`] lands after resolution against the capability.
enum KeyTarget {
    /// A complete base key, served by a direct backend lookup.
    Base(Record),
    /// An index key mapping, served by an equality query with limit 1.
    IndexLookup(Rule),
}

impl<M: Model> Store<M> {
    /// Opens a store over an already-built backend.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            capability: M::capability(),
            _model: PhantomData,
        }
    }

    /// Opens a store over the backend named by a loaded configuration.
    pub fn from_config(config: &GarnetConfig) -> Result<Self> {
        Ok(Self::new(open_backend(config)?))
    }

    /// The cached capability descriptor for `M`.
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Reports whether the model's table exists on the backend.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.backend.exists(&self.capability)?)
    }

    /// Creates the model's table and indexes; repeat calls are no-ops.
    pub fn initialize(&self) -> Result<()> {
        Ok(self.backend.initialize(&self.capability)?)
    }

    /// Fetches one record by key.
    ///
    /// Base-key forms go straight to the backend. A field mapping naming
    /// an index's partition key, and optionally its sort key, runs an
    /// equality query and returns the first match in ascending order.
    pub fn get(&self, key: impl Into<ModelKey>) -> Result<Option<M>> {
        match self.resolve_key(key.into())? {
            KeyTarget::Base(key) => {
                let found = self.backend.get(&self.capability, &key)?;
                found
                    .as_ref()
                    .map(M::from_record)
                    .transpose()
                    .map_err(Error::from)
            }
            KeyTarget::IndexLookup(rule) => self.query().matching(rule).first(),
        }
    }

    /// Writes one record, replacing any record stored under the same key.
    pub fn save(&self, instance: &M) -> Result<()> {
        let record = instance.to_record()?;
        self.backend.put(&self.capability, &record, None)?;
        Ok(())
    }

    /// Writes one record only if the guard holds.
    ///
    /// The guard judges the record currently stored under the same key; a
    /// fresh insert has nothing to judge and always applies. When the
    /// stored record fails the guard, nothing is written and
    /// [`Error::ConditionFailed`] is returned.
    pub fn save_when(&self, instance: &M, guard: &Rule) -> Result<()> {
        let record = instance.to_record()?;
        let filter = compile_guard(guard, &self.capability, self.backend.flavor())?;
        match self.backend.put(&self.capability, &record, Some(&filter))? {
            PutOutcome::Applied => Ok(()),
            PutOutcome::ConditionFailed => Err(Error::ConditionFailed),
        }
    }

    /// Writes a batch of records; atomicity is backend-defined.
    pub fn batch_save(&self, instances: &[M]) -> Result<()> {
        let mut records = Vec::with_capacity(instances.len());
        for instance in instances {
            records.push(instance.to_record()?);
        }
        Ok(self.backend.batch_put(&self.capability, &records)?)
    }

    /// Deletes one record by its base key; absent keys are a no-op.
    ///
    /// Only base-key forms are accepted here: an index mapping may match
    /// many records, so it is rejected as an invalid key.
    pub fn delete(&self, key: impl Into<ModelKey>) -> Result<()> {
        match self.resolve_key(key.into())? {
            KeyTarget::Base(key) => Ok(self.backend.delete(&self.capability, &key)?),
            KeyTarget::IndexLookup(_) => Err(self.invalid_key()),
        }
    }

    /// Starts a query over this store.
    pub fn query(&self) -> Query<'_, M> {
        Query::new(self)
    }

    // ------------------------------------------------------------------
    // Key resolution
    // ------------------------------------------------------------------

    fn invalid_key(&self) -> Error {
        Error::InvalidKey {
            model: self.capability.model().to_string(),
        }
    }

    fn resolve_key(&self, key: ModelKey) -> Result<KeyTarget> {
        match key {
            ModelKey::Hash(value) => {
                if self.capability.range_key().is_some() {
                    return Err(self.invalid_key());
                }
                let key = Record::new().with(self.capability.hash_key(), value);
                Ok(KeyTarget::Base(key))
            }
            ModelKey::HashRange(hash, range) => {
                let Some(range_key) = self.capability.range_key() else {
                    return Err(self.invalid_key());
                };
                let key = Record::new()
                    .with(self.capability.hash_key(), hash)
                    .with(range_key, range);
                Ok(KeyTarget::Base(key))
            }
            ModelKey::Fields(fields) => self.resolve_fields(fields),
        }
    }

    /// Matches a field mapping against the base key, then each index in
    /// declaration order.
    fn resolve_fields(&self, fields: Record) -> Result<KeyTarget> {
        let named: BTreeSet<&str> = fields.iter().map(|(field, _)| field).collect();
        let base: BTreeSet<&str> = self.capability.key_fields().into_iter().collect();
        if named == base {
            return Ok(KeyTarget::Base(fields));
        }
        for index in self.capability.indexes() {
            if !names_index_keys(&named, index) {
                continue;
            }
            let mut rule = Rule::eq(
                index.partition_key(),
                fields.get_or_null(index.partition_key()).clone(),
            );
            if let Some(sort) = index.sort_key().filter(|sort| named.contains(sort)) {
                rule = rule.and(Rule::eq(sort, fields.get_or_null(sort).clone()));
            }
            return Ok(KeyTarget::IndexLookup(rule));
        }
        Err(self.invalid_key())
    }
}

/// A mapping addresses an index when it names the partition key and at
/// most the sort key alongside it.
fn names_index_keys(named: &BTreeSet<&str>, index: &IndexDef) -> bool {
    named.contains(index.partition_key())
        && named
            .iter()
            .all(|field| *field == index.partition_key() || Some(*field) == index.sort_key())
}

impl<M: Model> std::fmt::Debug for Store<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("model", &self.capability.model())
            .field("flavor", &self.backend.flavor())
            .finish()
    }
}
