//! # garnet-kv: in-memory key/value backend for Garnet
//!
//! This crate provides [`MemoryKv`], a process-local [`Backend`] with the
//! storage shape of a remote key/value service. Records are lowered to
//! wire attributes on write and raised back on read, so every comparison
//! a query makes runs against the wire representation: numbers as exact
//! decimal text, datetimes as fixed-width UTC text, documents as
//! attribute trees.
//!
//! Keeping the wire shape in the store is what makes this engine an
//! honest stand-in: a filter that misbehaves against a real key/value
//! service misbehaves here too, and the query layer's equivalence
//! guarantees can be checked without network access.
//!
//! [`Backend`]: garnet_query::Backend

mod eval;
mod store;

pub use store::MemoryKv;
