//! Error types for rule planning and compilation.

use garnet_types::{SemanticType, Value};
use thiserror::Error;

/// Errors raised while planning a rule, compiling it to a native
/// expression, or resuming a paginated query.
///
/// Backend I/O failures are not represented here; adapters surface those
/// through the opaque [`garnet_types::BackendError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A rule referenced a field the model never declared.
    ///
    /// This is a caller programming error and is surfaced immediately, never
    /// absorbed into an always-scan plan.
    #[error("unknown field `{field}` on model `{model}`")]
    UndeclaredField {
        /// Model name.
        model: String,
        /// The undeclared field.
        field: String,
    },

    /// A plan named an index the capability descriptor does not declare.
    ///
    /// The planner never produces such a plan; this guards hand-assembled
    /// ones.
    #[error("unknown index `{index}` on model `{model}`")]
    UnknownIndex {
        /// Model name.
        model: String,
        /// The undeclared index.
        index: String,
    },

    /// An operator outside the key grammar reached a key condition.
    ///
    /// Key conditions accept equality on the hash key and, when the
    /// capability allows range conditions, equality or ordering on the
    /// range key. The compilers validate this even though the planner
    /// never emits a violating plan.
    #[error("operator `{op}` is not allowed in a key condition")]
    UnsupportedKeyOperator {
        /// The offending operator's symbol.
        op: String,
    },

    /// Descending order was requested for a scan-derived result set.
    #[error("descending order requires an indexed key condition, not a scan")]
    UnsupportedOrder,

    /// A literal could not be coerced to its field's semantic type.
    #[error("cannot coerce value `{value}` to {expected} for field `{field}`")]
    Coercion {
        /// Field the literal was compared against.
        field: String,
        /// Display form of the attempted value.
        value: String,
        /// The field's declared semantic type.
        expected: SemanticType,
    },

    /// A continuation token failed to decode or was issued for a
    /// different model, index, or plan shape.
    #[error("invalid continuation token: {0}")]
    InvalidToken(String),
}

impl QueryError {
    pub(crate) fn coercion(field: &str, value: &Value, expected: SemanticType) -> Self {
        QueryError::Coercion {
            field: field.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    pub(crate) fn key_operator(op: impl Into<String>) -> Self {
        QueryError::UnsupportedKeyOperator { op: op.into() }
    }

    pub(crate) fn token(reason: impl Into<String>) -> Self {
        QueryError::InvalidToken(reason.into())
    }
}

/// Result type for planning and compilation operations.
///
/// The error parameter defaults to [`QueryError`]; backend traits override
/// it with [`garnet_types::BackendError`] for engine-side failures.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;
