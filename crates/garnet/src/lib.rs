//! # Garnet
//!
//! Rule-driven record store over pluggable backends.
//!
//! Garnet plans a caller's rule into index key conditions plus a residual
//! filter, compiles both for the backend at hand, and pages results behind
//! opaque continuation tokens. This provides:
//!
//! - **One query surface** - The same rule AST runs on every backend
//! - **Planned access** - Index choice happens before compilation, never inside it
//! - **Honest errors** - Capability mismatches surface immediately instead of
//!   silently degrading to scans
//! - **Stable pagination** - Tokens are bound to a model and plan shape, and
//!   survive process restarts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Garnet                            │
//! │  ┌─────────┐   ┌───────────┐   ┌────────────┐   ┌─────────┐  │
//! │  │  Rule   │ → │  Planner  │ → │  Compiler  │ → │ Backend │  │
//! │  │  (AST)  │   │(key/resid)│   │ (KV / SQL) │   │ (trait) │  │
//! │  └─────────┘   └───────────┘   └────────────┘   └─────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use garnet::{MemoryKv, Model, Rule, Store};
//!
//! // Task implements Model: capability(), to_record(), from_record()
//! let store: Store<Task> = Store::new(Box::new(MemoryKv::new()));
//! store.initialize()?;
//!
//! // Write and read back by key
//! store.save(&task)?;
//! let found = store.get(("ada", 3))?;
//!
//! // Query with a rule; equality on key fields becomes an index lookup
//! let page = store
//!     .query()
//!     .matching(Rule::eq("user", "ada").and(Rule::gt("ts", 100)))
//!     .limit(10)
//!     .fetch()?;
//! ```
//!
//! # Modules
//!
//! - **Facade**: [`Store`], [`Query`], [`Model`] - Main API
//! - **Planning**: Rule AST, planner, and per-flavor predicate compilers
//! - **Backends**: In-memory key/value and embedded SQLite

mod error;
mod model;
mod query;
mod store;

// Facade - Main API
pub use error::{Error, Result};
pub use model::{Model, ModelKey};
pub use query::{Page, Query};
pub use store::{Store, open_backend};

// Re-export record primitives
pub use garnet_types::{AttrValue, BackendError, Record, RecordError, SemanticType, Value};

// Re-export the rule and planning surface
pub use garnet_query::{
    Capability, CapabilityBuilder, CapabilityError, CompareOp, IndexDef, IndexKind, Order,
    PageToken, QueryError, QueryPlan, Rule, plan,
};

// Re-export the backend contract for custom adapters
pub use garnet_query::{
    Backend, CompiledQuery, Flavor, NativeFilter, PutOutcome, RawPage, Window, compile,
    compile_guard,
};

// Re-export bundled backends
pub use garnet_kv::MemoryKv;
pub use garnet_sqlite::SqliteBackend;

// Re-export configuration
pub use garnet_config::{BackendKind, ConfigError, ConfigLoader, GarnetConfig};
