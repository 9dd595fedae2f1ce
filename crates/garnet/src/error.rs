//! Facade-level error type.

use garnet_query::QueryError;
use garnet_types::{BackendError, RecordError};
use thiserror::Error;

/// Any failure a [`Store`](crate::Store) call can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Planning, compilation, ordering, coercion, or token failure.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Backend failure, passed through unchanged.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A model instance or stored record failed to encode or decode.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// A guarded save found an existing record that fails the guard.
    #[error("condition failed: the stored record does not satisfy the guard")]
    ConditionFailed,

    /// A key whose fields match neither the base key nor any declared index.
    #[error("key shape does not address the base key or any index of model `{model}`")]
    InvalidKey {
        /// Model the key was aimed at.
        model: String,
    },
}

/// Convenience alias for facade results.
pub type Result<T> = std::result::Result<T, Error>;
