//! Embedded SQLite engine.
//!
//! One connection behind a mutex serves every model. Tables are created
//! from capability metadata with the renderer's column affinities, and
//! declared secondary indexes become plain SQLite indexes over their
//! partition and sort columns. Queries execute the renderer's fragments
//! verbatim; this module only assembles SELECT statements around them.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use garnet_query::sql::{self, SqlFragment, SqlParam};
use garnet_query::{
    Backend, Capability, CompiledQuery, Flavor, IndexDef, NativeFilter, PutOutcome, RawPage,
    Window,
};
use garnet_types::{BackendError, Record, SemanticType};
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use tracing::debug;

use crate::row;

/// A [`Backend`] over a single SQLite database file.
///
/// All models share the connection; each model owns one table named
/// after it. The connection runs in WAL mode when file-backed.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(BackendError::new)?;
            }
        }
        let conn = Connection::open(path).map_err(BackendError::new)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(BackendError::new)?;
        debug!(path = %path.display(), "opened sqlite database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory().map_err(BackendError::new)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// ============================================================================
// Statement assembly
// ============================================================================

fn poisoned() -> BackendError {
    BackendError::msg("lock poisoned")
}

fn quoted_key_fields(capability: &Capability) -> Vec<String> {
    capability
        .key_fields()
        .iter()
        .map(|field| sql::quote_ident(field))
        .collect()
}

fn select_list(capability: &Capability) -> String {
    capability
        .fields()
        .map(|(field, _)| sql::quote_ident(field))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"k1" = ? AND "k2" = ?` over the base key.
fn key_clause(capability: &Capability) -> String {
    quoted_key_fields(capability)
        .iter()
        .map(|ident| format!("{ident} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn create_table_sql(capability: &Capability) -> String {
    let key_fields = capability.key_fields();
    let columns = capability
        .fields()
        .map(|(field, semantic)| {
            let mut column = format!("{} {}", sql::quote_ident(field), sql::column_type(semantic));
            if key_fields.contains(&field) {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns}, PRIMARY KEY ({}))",
        sql::quote_ident(capability.model()),
        quoted_key_fields(capability).join(", "),
    )
}

fn create_index_sql(capability: &Capability, index: &IndexDef) -> String {
    let mut columns = vec![sql::quote_ident(index.partition_key())];
    if let Some(sort) = index.sort_key() {
        columns.push(sql::quote_ident(sort));
    }
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        sql::quote_ident(&format!("idx_{}_{}", capability.model(), index.name())),
        sql::quote_ident(capability.model()),
        columns.join(", "),
    )
}

/// Whole-row upsert: every declared column is written, so a put
/// replaces the record rather than merging into it.
fn upsert_sql(capability: &Capability) -> String {
    let key_fields = capability.key_fields();
    let columns: Vec<String> = capability
        .fields()
        .map(|(field, _)| sql::quote_ident(field))
        .collect();
    let holes = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = capability
        .fields()
        .map(|(field, _)| field)
        .filter(|field| !key_fields.contains(field))
        .map(|field| format!("{0} = excluded.{0}", sql::quote_ident(field)))
        .collect();
    let action = if updates.is_empty() {
        "NOTHING".to_string()
    } else {
        format!("UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({holes}) ON CONFLICT ({}) DO {action}",
        sql::quote_ident(capability.model()),
        columns.join(", "),
        quoted_key_fields(capability).join(", "),
    )
}

fn resolve_index<'a>(
    capability: &'a Capability,
    name: Option<&str>,
) -> Result<Option<&'a IndexDef>, BackendError> {
    match name {
        None => Ok(None),
        Some(name) => capability
            .index(name)
            .map(Some)
            .ok_or_else(|| BackendError::msg(format!("query names unknown index `{name}`"))),
    }
}

fn ordering_columns(
    capability: &Capability,
    fields: &[String],
) -> Result<Vec<(String, SemanticType)>, BackendError> {
    fields
        .iter()
        .map(|field| {
            capability
                .field_type(field)
                .map(|semantic| (field.clone(), semantic))
                .ok_or_else(|| {
                    BackendError::msg(format!("ordering field `{field}` is not declared"))
                })
        })
        .collect()
}

/// The WHERE material for one windowed query: the plan's predicate plus
/// the keyset comparison when the window resumes from a token.
fn where_fragment(
    predicate: Option<&SqlFragment>,
    columns: &[(String, SemanticType)],
    window: &Window,
) -> Result<Option<SqlFragment>, BackendError> {
    let mut clauses: Vec<SqlFragment> = Vec::new();
    if let Some(predicate) = predicate {
        clauses.push(predicate.clone());
    }
    if let Some(after) = &window.start_after {
        clauses.push(
            sql::keyset_predicate(columns, after, window.order).map_err(BackendError::new)?,
        );
    }
    Ok(SqlFragment::and_join(clauses))
}

fn sql_query(query: &CompiledQuery) -> Result<(Option<&str>, Option<&SqlFragment>), BackendError> {
    match query {
        CompiledQuery::Sql { index, predicate } => Ok((index.as_deref(), predicate.as_ref())),
        CompiledQuery::Kv(_) => Err(BackendError::msg(
            "query was compiled for a key/value backend",
        )),
    }
}

// ============================================================================
// Backend implementation
// ============================================================================

impl Backend for SqliteBackend {
    fn flavor(&self) -> Flavor {
        Flavor::Relational
    }

    fn exists(&self, capability: &Capability) -> Result<bool, BackendError> {
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [capability.model()],
                |row| row.get(0),
            )
            .map_err(BackendError::new)?;
        Ok(count > 0)
    }

    fn initialize(&self, capability: &Capability) -> Result<(), BackendError> {
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        conn.execute(&create_table_sql(capability), [])
            .map_err(BackendError::new)?;
        for index in capability.indexes() {
            conn.execute(&create_index_sql(capability, index), [])
                .map_err(BackendError::new)?;
        }
        debug!(model = %capability.model(), "ensured sqlite table");
        Ok(())
    }

    fn get(&self, capability: &Capability, key: &Record) -> Result<Option<Record>, BackendError> {
        let params = row::key_params(capability, key)?;
        let text = format!(
            "SELECT {} FROM {} WHERE {}",
            select_list(capability),
            sql::quote_ident(capability.model()),
            key_clause(capability),
        );
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        let mut stmt = conn.prepare(&text).map_err(BackendError::new)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(row::bind_value)))
            .map_err(BackendError::new)?;
        match rows.next().map_err(BackendError::new)? {
            None => Ok(None),
            Some(found) => Ok(Some(row::read_record(found, capability)?)),
        }
    }

    fn put(
        &self,
        capability: &Capability,
        record: &Record,
        guard: Option<&NativeFilter>,
    ) -> Result<PutOutcome, BackendError> {
        let params = row::write_params(capability, record)?;
        let guard = match guard {
            None => None,
            Some(NativeFilter::Sql(fragment)) => Some(fragment),
            Some(NativeFilter::Kv(_)) => {
                return Err(BackendError::msg(
                    "guard was compiled for a key/value backend",
                ));
            }
        };

        let mut conn = self.conn.lock().map_err(|_| poisoned())?;
        let tx = conn.transaction().map_err(BackendError::new)?;
        if let Some(fragment) = guard {
            let key_params = row::key_params(capability, record)?;
            let probe = format!(
                "SELECT 1 FROM {} WHERE {}",
                sql::quote_ident(capability.model()),
                key_clause(capability),
            );
            let existing: Option<i64> = tx
                .query_row(
                    &probe,
                    params_from_iter(key_params.iter().map(row::bind_value)),
                    |row| row.get(0),
                )
                .optional()
                .map_err(BackendError::new)?;
            // The guard judges the record being replaced; a fresh insert
            // has nothing to judge and always applies.
            if existing.is_some() {
                let guarded = format!("{probe} AND {}", fragment.sql);
                let mut all = key_params;
                all.extend(fragment.params.iter().cloned());
                let passes: Option<i64> = tx
                    .query_row(
                        &guarded,
                        params_from_iter(all.iter().map(row::bind_value)),
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(BackendError::new)?;
                if passes.is_none() {
                    return Ok(PutOutcome::ConditionFailed);
                }
            }
        }
        tx.execute(
            &upsert_sql(capability),
            params_from_iter(params.iter().map(row::bind_value)),
        )
        .map_err(BackendError::new)?;
        tx.commit().map_err(BackendError::new)?;
        Ok(PutOutcome::Applied)
    }

    fn batch_put(
        &self,
        capability: &Capability,
        records: &[Record],
    ) -> Result<(), BackendError> {
        let mut lowered = Vec::with_capacity(records.len());
        for record in records {
            lowered.push(row::write_params(capability, record)?);
        }
        let mut conn = self.conn.lock().map_err(|_| poisoned())?;
        let tx = conn.transaction().map_err(BackendError::new)?;
        {
            let mut stmt = tx
                .prepare(&upsert_sql(capability))
                .map_err(BackendError::new)?;
            for params in &lowered {
                stmt.execute(params_from_iter(params.iter().map(row::bind_value)))
                    .map_err(BackendError::new)?;
            }
        }
        tx.commit().map_err(BackendError::new)?;
        Ok(())
    }

    fn delete(&self, capability: &Capability, key: &Record) -> Result<(), BackendError> {
        let params = row::key_params(capability, key)?;
        let text = format!(
            "DELETE FROM {} WHERE {}",
            sql::quote_ident(capability.model()),
            key_clause(capability),
        );
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        conn.execute(&text, params_from_iter(params.iter().map(row::bind_value)))
            .map_err(BackendError::new)?;
        Ok(())
    }

    fn execute(
        &self,
        capability: &Capability,
        query: &CompiledQuery,
        window: &Window,
    ) -> Result<RawPage, BackendError> {
        let (index, predicate) = sql_query(query)?;
        let index = resolve_index(capability, index)?;
        let fields = capability.resume_fields(index);
        let columns = ordering_columns(capability, &fields)?;

        let mut text = format!(
            "SELECT {} FROM {}",
            select_list(capability),
            sql::quote_ident(capability.model()),
        );
        let mut params: Vec<SqlParam> = Vec::new();
        if let Some(filter) = where_fragment(predicate, &columns, window)? {
            text.push_str(" WHERE ");
            text.push_str(&filter.sql);
            params.extend(filter.params);
        }
        let direction = if window.order.is_descending() {
            "DESC"
        } else {
            "ASC"
        };
        let order_list = columns
            .iter()
            .map(|(field, semantic)| format!("{} {direction}", sql::order_column(field, *semantic)))
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(" ORDER BY ");
        text.push_str(&order_list);
        if let Some(limit) = window.limit {
            // Fetch one past the window to learn whether more rows remain.
            text.push_str(" LIMIT ?");
            params.push(SqlParam::Integer(limit as i64 + 1));
        }

        let conn = self.conn.lock().map_err(|_| poisoned())?;
        let mut stmt = conn.prepare(&text).map_err(BackendError::new)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(row::bind_value)))
            .map_err(BackendError::new)?;
        let mut items = Vec::new();
        while let Some(found) = rows.next().map_err(BackendError::new)? {
            items.push(row::read_record(found, capability)?);
        }

        let mut last_key = None;
        if let Some(limit) = window.limit {
            if items.len() > limit {
                items.truncate(limit);
                last_key = items.last().map(|record| {
                    let mut key = Record::new();
                    for field in &fields {
                        if let Some(value) = record.get(field) {
                            key.set(field.clone(), value.clone());
                        }
                    }
                    key
                });
            }
        }

        debug!(
            model = %capability.model(),
            returned = items.len(),
            more = last_key.is_some(),
            "executed sqlite query"
        );
        Ok(RawPage { items, last_key })
    }

    fn count(
        &self,
        capability: &Capability,
        query: &CompiledQuery,
        window: &Window,
    ) -> Result<u64, BackendError> {
        let (index, predicate) = sql_query(query)?;
        let index = resolve_index(capability, index)?;
        let fields = capability.resume_fields(index);
        let columns = ordering_columns(capability, &fields)?;

        let mut inner = format!("SELECT 1 FROM {}", sql::quote_ident(capability.model()));
        let mut params: Vec<SqlParam> = Vec::new();
        if let Some(filter) = where_fragment(predicate, &columns, window)? {
            inner.push_str(" WHERE ");
            inner.push_str(&filter.sql);
            params.extend(filter.params);
        }
        if let Some(limit) = window.limit {
            inner.push_str(" LIMIT ?");
            params.push(SqlParam::Integer(limit as i64));
        }

        let text = format!("SELECT COUNT(*) FROM ({inner})");
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        let count: i64 = conn
            .query_row(
                &text,
                params_from_iter(params.iter().map(row::bind_value)),
                |row| row.get(0),
            )
            .map_err(BackendError::new)?;
        Ok(count as u64)
    }
}
