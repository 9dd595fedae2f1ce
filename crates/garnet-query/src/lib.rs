//! # garnet-query: rule planning and predicate compilation
//!
//! This crate turns a model's filter rules into something a storage
//! engine can execute. It is the backend-agnostic middle of Garnet:
//! models and stores live in the facade crate, engines live in the
//! adapter crates, and everything in between happens here.
//!
//! ## Pipeline
//!
//! 1. A model declares a [`Capability`]: its fields and semantic types,
//!    its hash/range key, its secondary indexes, and whether the engine
//!    honors ordering comparisons on a sort key.
//! 2. [`plan`] walks a [`Rule`] and splits it into a key condition the
//!    engine can address directly and a residual filter applied after
//!    retrieval, or falls back to a full scan.
//! 3. [`compile`] renders both parts in the engine's [`Flavor`]: wire-typed
//!    conditions for a key/value store ([`kv`]), or a parameterized
//!    predicate for an embedded relational store ([`sql`]).
//! 4. A [`Backend`] executes the compiled query one page at a time;
//!    [`cursor`] seals each page boundary into an opaque token that
//!    resumes strictly after the last record returned.
//!
//! Both renderers agree with [`Rule::eval`] record for record, including
//! the two-valued null logic: comparing against a missing or null field
//! is false, a null literal is the presence test, and `not` is plain
//! negation.
//!
//! ## Usage
//!
//! ```
//! use garnet_query::{Capability, Flavor, Rule, SemanticType, compile, plan};
//!
//! let capability = Capability::builder("user")
//!     .field("id", SemanticType::Integer)
//!     .field("name", SemanticType::Text)
//!     .hash_key("id")
//!     .build()?;
//!
//! // `id` is the hash key, so this plans as a key lookup with a
//! // residual filter on `name`.
//! let rule = Rule::eq("id", 2).and(Rule::eq("name", "b"));
//! let plan = plan(Some(&rule), &capability)?;
//! assert!(!plan.is_scan);
//!
//! let compiled = compile(&plan, &capability, Flavor::Relational)?;
//! # let _ = compiled;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod backend;
mod coerce;
pub mod cursor;
mod error;
pub mod kv;
mod plan;
mod planner;
mod rule;
mod schema;
pub mod sql;


// Re-export public types
pub use backend::{Backend, CompiledQuery, Flavor, NativeFilter, PutOutcome, compile, compile_guard};
pub use cursor::PageToken;
pub use error::{QueryError, Result};
pub use plan::{Order, QueryPlan, RawPage, Window};
pub use planner::plan;
pub use rule::{CompareOp, Rule};
pub use schema::{Capability, CapabilityBuilder, CapabilityError, IndexDef, IndexKind};

// Shared value types, re-exported so downstream crates need only one
// query import.
pub use garnet_types::{AttrValue, BackendError, Record, SemanticType, Value};
