//! # garnet-sqlite: embedded SQLite backend for Garnet
//!
//! This crate provides [`SqliteBackend`], a [`Backend`] over a single
//! SQLite database file (or a private in-memory database). Each model
//! maps to one table whose columns carry the renderer's storage
//! affinities, so the SQL the query layer renders binds and compares
//! without any per-backend translation:
//!
//! - integers, booleans, and epoch timestamps in INTEGER columns
//! - doubles in REAL columns
//! - text, normalized decimals, fixed-width UTC datetimes, and
//!   canonical JSON in TEXT columns
//!
//! Declared secondary indexes become SQLite indexes over their
//! partition and sort columns. They accelerate queries but never change
//! results; ordering and continuation always run over the plan's
//! resume columns.
//!
//! [`Backend`]: garnet_query::Backend

mod row;
mod store;

pub use store::SqliteBackend;
