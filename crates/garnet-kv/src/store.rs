//! In-memory key/value engine.
//!
//! Tables live in one `RwLock`ed map keyed by model name. Each table maps
//! a lowered primary-key tuple to a row of wire attributes, so the engine
//! sees records exactly as a remote key/value service would: numbers as
//! decimal text, datetimes as fixed-width text, documents as attribute
//! trees. Plans compiled for [`Flavor::KeyValue`] evaluate over those
//! attributes without ever raising them back to runtime values.

use std::collections::BTreeMap;
use std::sync::RwLock;

use garnet_query::kv::KvQuery;
use garnet_query::{
    Backend, Capability, CompiledQuery, Flavor, IndexDef, NativeFilter, PutOutcome, RawPage,
    Window,
};
use garnet_types::{AttrValue, BackendError, Record};
use tracing::debug;

use crate::eval::{Row, SortPart, eval_condition, matches_key, sort_part};

/// A lowered primary-key tuple.
///
/// Rows are stored under their key tuple, which makes full scans come
/// back in key order without a separate sort.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RowKey(Vec<SortPart>);

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<RowKey, Row>,
}

/// A process-local [`Backend`] that stores rows as wire attributes.
///
/// The engine honors the same query semantics as the relational backend:
/// key conditions evaluate as plain predicates over the whole table,
/// result sets order by the plan's resume columns with absent values
/// first, and a continuation window resumes strictly after the token's
/// key tuple.
#[derive(Debug, Default)]
pub struct MemoryKv {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl MemoryKv {
    /// Creates an empty engine with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Lowering and raising
// ============================================================================

fn no_table(model: &str) -> BackendError {
    BackendError::msg(format!("no table exists for model `{model}`"))
}

fn poisoned() -> BackendError {
    BackendError::msg("lock poisoned")
}

/// Lowers a runtime record onto the wire: declared fields only, nulls
/// dropped so that null and missing are the same stored shape.
fn lower_record(capability: &Capability, record: &Record) -> Result<Row, BackendError> {
    let mut row = Row::new();
    for (field, value) in record.iter() {
        let Some(semantic) = capability.field_type(field) else {
            return Err(BackendError::msg(format!(
                "field `{field}` is not declared on model `{}`",
                capability.model()
            )));
        };
        if value.is_null() {
            continue;
        }
        let attr = AttrValue::from_value(value, semantic).map_err(BackendError::new)?;
        row.insert(field.to_string(), attr);
    }
    Ok(row)
}

fn raise_row(capability: &Capability, row: &Row) -> Result<Record, BackendError> {
    let mut record = Record::new();
    for (field, attr) in row {
        let semantic = capability.field_type(field).ok_or_else(|| {
            BackendError::msg(format!(
                "stored field `{field}` is not declared on model `{}`",
                capability.model()
            ))
        })?;
        let value = attr.to_value(semantic).map_err(BackendError::new)?;
        record.set(field.clone(), value);
    }
    Ok(record)
}

/// Lowers the base-key fields of a record into the table's key tuple.
fn key_of_record(capability: &Capability, record: &Record) -> Result<RowKey, BackendError> {
    let mut parts = Vec::new();
    for field in capability.key_fields() {
        let value = record
            .get(field)
            .filter(|value| !value.is_null())
            .ok_or_else(|| BackendError::msg(format!("record is missing key field `{field}`")))?;
        let semantic = capability
            .field_type(field)
            .ok_or_else(|| BackendError::msg(format!("key field `{field}` is not declared")))?;
        let attr = AttrValue::from_value(value, semantic).map_err(BackendError::new)?;
        let part = sort_part(&attr).ok_or_else(|| {
            BackendError::msg(format!("key field `{field}` cannot be ordered"))
        })?;
        parts.push(part);
    }
    Ok(RowKey(parts))
}

// ============================================================================
// Query execution
// ============================================================================

fn kv_query(query: &CompiledQuery) -> Result<&KvQuery, BackendError> {
    match query {
        CompiledQuery::Kv(kv) => Ok(kv),
        CompiledQuery::Sql { .. } => Err(BackendError::msg(
            "query was compiled for a relational backend",
        )),
    }
}

fn resolve_index<'a>(
    capability: &'a Capability,
    query: &KvQuery,
) -> Result<Option<&'a IndexDef>, BackendError> {
    match query.index.as_deref() {
        None => Ok(None),
        Some(name) => capability
            .index(name)
            .map(Some)
            .ok_or_else(|| BackendError::msg(format!("query names unknown index `{name}`"))),
    }
}

/// Lowers a resume record into the ordering tuple it stands for. Every
/// field must be present and orderable; token decoding guarantees both.
fn start_tuple(
    capability: &Capability,
    fields: &[String],
    record: &Record,
) -> Result<Vec<Option<SortPart>>, BackendError> {
    fields
        .iter()
        .map(|field| {
            let value = record
                .get(field)
                .filter(|value| !value.is_null())
                .ok_or_else(|| {
                    BackendError::msg(format!("resume key is missing field `{field}`"))
                })?;
            let semantic = capability.field_type(field).ok_or_else(|| {
                BackendError::msg(format!("resume field `{field}` is not declared"))
            })?;
            let attr = AttrValue::from_value(value, semantic).map_err(BackendError::new)?;
            sort_part(&attr).map(Some).ok_or_else(|| {
                BackendError::msg(format!("resume field `{field}` cannot be ordered"))
            })
        })
        .collect()
}

/// Filters, windows, and orders a table's rows for one compiled query.
///
/// Returns every match in page order, each paired with its ordering
/// tuple. Rows with an absent value in any ordering column sort first
/// ascending; once a window resumes from a token, such rows are excluded
/// outright because they have no position relative to the resume tuple.
fn matching(
    table: &Table,
    capability: &Capability,
    fields: &[String],
    query: &KvQuery,
    window: &Window,
) -> Result<Vec<(Vec<Option<SortPart>>, Row)>, BackendError> {
    let mut entries: Vec<(Vec<Option<SortPart>>, Row)> = Vec::new();
    for row in table.rows.values() {
        if let Some(key) = &query.key {
            if !matches_key(row, key) {
                continue;
            }
        }
        if let Some(filter) = &query.filter {
            if !eval_condition(row, filter) {
                continue;
            }
        }
        let tuple = fields
            .iter()
            .map(|field| row.get(field).and_then(sort_part))
            .collect();
        entries.push((tuple, row.clone()));
    }

    if let Some(start) = &window.start_after {
        let start = start_tuple(capability, fields, start)?;
        entries.retain(|(tuple, _)| {
            tuple.iter().all(Option::is_some)
                && if window.order.is_descending() {
                    *tuple < start
                } else {
                    *tuple > start
                }
        });
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    if window.order.is_descending() {
        entries.reverse();
    }
    Ok(entries)
}

// ============================================================================
// Backend implementation
// ============================================================================

impl Backend for MemoryKv {
    fn flavor(&self) -> Flavor {
        Flavor::KeyValue
    }

    fn exists(&self, capability: &Capability) -> Result<bool, BackendError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.contains_key(capability.model()))
    }

    fn initialize(&self, capability: &Capability) -> Result<(), BackendError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if !tables.contains_key(capability.model()) {
            tables.insert(capability.model().to_string(), Table::default());
            debug!(model = %capability.model(), "created in-memory table");
        }
        Ok(())
    }

    fn get(&self, capability: &Capability, key: &Record) -> Result<Option<Record>, BackendError> {
        let key = key_of_record(capability, key)?;
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let table = tables
            .get(capability.model())
            .ok_or_else(|| no_table(capability.model()))?;
        table
            .rows
            .get(&key)
            .map(|row| raise_row(capability, row))
            .transpose()
    }

    fn put(
        &self,
        capability: &Capability,
        record: &Record,
        guard: Option<&NativeFilter>,
    ) -> Result<PutOutcome, BackendError> {
        let row = lower_record(capability, record)?;
        let key = key_of_record(capability, record)?;
        let condition = match guard {
            None => None,
            Some(NativeFilter::Kv(condition)) => Some(condition),
            Some(NativeFilter::Sql(_)) => {
                return Err(BackendError::msg(
                    "guard was compiled for a relational backend",
                ));
            }
        };
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let table = tables
            .get_mut(capability.model())
            .ok_or_else(|| no_table(capability.model()))?;
        // The guard judges the record being replaced; a fresh insert has
        // nothing to judge and always applies.
        if let (Some(condition), Some(existing)) = (condition, table.rows.get(&key)) {
            if !eval_condition(existing, condition) {
                return Ok(PutOutcome::ConditionFailed);
            }
        }
        table.rows.insert(key, row);
        Ok(PutOutcome::Applied)
    }

    fn batch_put(
        &self,
        capability: &Capability,
        records: &[Record],
    ) -> Result<(), BackendError> {
        let mut lowered = Vec::with_capacity(records.len());
        for record in records {
            let row = lower_record(capability, record)?;
            let key = key_of_record(capability, record)?;
            lowered.push((key, row));
        }
        // Every record lowered cleanly, so the batch lands whole under a
        // single write lock.
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let table = tables
            .get_mut(capability.model())
            .ok_or_else(|| no_table(capability.model()))?;
        for (key, row) in lowered {
            table.rows.insert(key, row);
        }
        Ok(())
    }

    fn delete(&self, capability: &Capability, key: &Record) -> Result<(), BackendError> {
        let key = key_of_record(capability, key)?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let table = tables
            .get_mut(capability.model())
            .ok_or_else(|| no_table(capability.model()))?;
        table.rows.remove(&key);
        Ok(())
    }

    fn execute(
        &self,
        capability: &Capability,
        query: &CompiledQuery,
        window: &Window,
    ) -> Result<RawPage, BackendError> {
        let query = kv_query(query)?;
        let index = resolve_index(capability, query)?;
        let fields = capability.resume_fields(index);

        let tables = self.tables.read().map_err(|_| poisoned())?;
        let table = tables
            .get(capability.model())
            .ok_or_else(|| no_table(capability.model()))?;
        let mut entries = matching(table, capability, &fields, query, window)?;
        drop(tables);

        let mut more = false;
        if let Some(limit) = window.limit {
            if entries.len() > limit {
                entries.truncate(limit);
                more = true;
            }
        }

        let mut items = Vec::with_capacity(entries.len());
        for (_, row) in &entries {
            items.push(raise_row(capability, row)?);
        }
        let last_key = if more {
            items.last().map(|record| {
                let mut key = Record::new();
                for field in &fields {
                    if let Some(value) = record.get(field) {
                        key.set(field.clone(), value.clone());
                    }
                }
                key
            })
        } else {
            None
        };

        debug!(
            model = %capability.model(),
            returned = items.len(),
            more,
            "executed key/value query"
        );
        Ok(RawPage { items, last_key })
    }

    fn count(
        &self,
        capability: &Capability,
        query: &CompiledQuery,
        window: &Window,
    ) -> Result<u64, BackendError> {
        let query = kv_query(query)?;
        let index = resolve_index(capability, query)?;
        let fields = capability.resume_fields(index);

        let tables = self.tables.read().map_err(|_| poisoned())?;
        let table = tables
            .get(capability.model())
            .ok_or_else(|| no_table(capability.model()))?;
        let entries = matching(table, capability, &fields, query, window)?;

        let mut count = entries.len();
        if let Some(limit) = window.limit {
            count = count.min(limit);
        }
        Ok(count as u64)
    }
}
