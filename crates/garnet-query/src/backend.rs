//! Backend adapter trait.
//!
//! The [`Backend`] trait abstracts the storage engine behind a model:
//! - a key/value store addressed by partition and sort keys
//! - an embedded relational store queried through SQL
//!
//! Everything above this trait is backend-agnostic. The only places the
//! core acknowledges a concrete engine are the capability descriptor a
//! model declares and the [`Flavor`] a backend reports, which selects
//! which predicate renderer compiles its plans. The abstraction keeps the
//! planner and pagination logic testable against an in-memory engine.

use garnet_types::{BackendError, Record};

use crate::error::Result;
use crate::kv::{self, KvCondition, KvQuery};
use crate::plan::{QueryPlan, RawPage, Window};
use crate::rule::Rule;
use crate::schema::Capability;
use crate::sql::{self, SqlFragment};

/// Which predicate renderer a backend consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Wire-typed key conditions and filter trees.
    KeyValue,
    /// Parameterized SQL predicates.
    Relational,
}

/// A plan compiled into one backend's native form.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledQuery {
    /// Key/value form.
    Kv(KvQuery),
    /// Relational form; `predicate` is the `WHERE` body, absent on a
    /// bare scan.
    Sql {
        /// Secondary index the plan chose; `None` targets the base table.
        index: Option<String>,
        /// Rendered predicate and its parameters.
        predicate: Option<SqlFragment>,
    },
}

impl CompiledQuery {
    /// The secondary index this query runs against, if any.
    pub fn index(&self) -> Option<&str> {
        match self {
            CompiledQuery::Kv(query) => query.index.as_deref(),
            CompiledQuery::Sql { index, .. } => index.as_deref(),
        }
    }
}

/// A standalone filter compiled into one backend's native form, used as
/// a save guard.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeFilter {
    /// Key/value form.
    Kv(KvCondition),
    /// Relational form.
    Sql(SqlFragment),
}

/// Outcome of a put that may carry a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was written.
    Applied,
    /// A record with the same key exists and the guard rejected it;
    /// nothing was written.
    ConditionFailed,
}

impl PutOutcome {
    /// Returns true when the write happened.
    pub fn is_applied(self) -> bool {
        matches!(self, PutOutcome::Applied)
    }
}

/// Compiles a plan for a backend of the given flavor.
///
/// # Errors
///
/// Everything the flavor's renderer can raise: unknown indexes, key
/// grammar violations, and literal coercion failures.
pub fn compile(plan: &QueryPlan, capability: &Capability, flavor: Flavor) -> Result<CompiledQuery> {
    match flavor {
        Flavor::KeyValue => Ok(CompiledQuery::Kv(kv::compile_plan(plan, capability)?)),
        Flavor::Relational => Ok(CompiledQuery::Sql {
            index: plan.chosen_index.clone(),
            predicate: sql::compile_plan(plan, capability)?,
        }),
    }
}

/// Compiles a save guard for a backend of the given flavor.
///
/// # Errors
///
/// [`QueryError::UndeclaredField`] and [`QueryError::Coercion`] as for
/// any filter compilation.
///
/// [`QueryError::UndeclaredField`]: crate::QueryError::UndeclaredField
/// [`QueryError::Coercion`]: crate::QueryError::Coercion
pub fn compile_guard(
    rule: &Rule,
    capability: &Capability,
    flavor: Flavor,
) -> Result<NativeFilter> {
    match flavor {
        Flavor::KeyValue => Ok(NativeFilter::Kv(kv::compile_filter(rule, capability)?)),
        Flavor::Relational => Ok(NativeFilter::Sql(sql::compile_filter(rule, capability)?)),
    }
}

/// A storage engine hosting one or more models.
///
/// Implementations are synchronous and must be safe to share across
/// threads; each call is one round trip with no state carried between
/// calls. Key arguments are records holding exactly the base key fields.
/// `execute` iterates the plan's resume tuple in `window` order and
/// returns records strictly after `window.start_after` when present;
/// scans are always ascending, which the plan layer has already enforced.
pub trait Backend: Send + Sync {
    /// Which renderer compiles plans for this backend.
    fn flavor(&self) -> Flavor;

    /// Returns whether the model's table exists.
    fn exists(&self, capability: &Capability) -> Result<bool, BackendError>;

    /// Creates the model's table and declared indexes if absent.
    fn initialize(&self, capability: &Capability) -> Result<(), BackendError>;

    /// Fetches one record by its base key.
    fn get(&self, capability: &Capability, key: &Record) -> Result<Option<Record>, BackendError>;

    /// Writes one record, replacing any record with the same key.
    ///
    /// With a guard, the replacement only happens when the existing
    /// record satisfies it; inserting a fresh key always applies. The
    /// guard never reads the record being written.
    fn put(
        &self,
        capability: &Capability,
        record: &Record,
        guard: Option<&NativeFilter>,
    ) -> Result<PutOutcome, BackendError>;

    /// Writes a batch of records; atomicity is backend-defined.
    fn batch_put(&self, capability: &Capability, records: &[Record]) -> Result<(), BackendError>;

    /// Deletes one record by its base key; absent keys are a no-op.
    fn delete(&self, capability: &Capability, key: &Record) -> Result<(), BackendError>;

    /// Runs a compiled plan and returns one page of records.
    fn execute(
        &self,
        capability: &Capability,
        query: &CompiledQuery,
        window: &Window,
    ) -> Result<RawPage, BackendError>;

    /// Runs a compiled plan and returns how many records the window
    /// would yield.
    fn count(
        &self,
        capability: &Capability,
        query: &CompiledQuery,
        window: &Window,
    ) -> Result<u64, BackendError>;
}
