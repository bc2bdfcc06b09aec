//! Error types for the domain stores.

use mapstore_core::CoreError;
use thiserror::Error;

/// Result type for domain store operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors surfaced by domain stores.
///
/// Engine errors a caller can act on are translated into their own
/// variants; everything else is carried as [`ModelError::Core`].
#[derive(Debug, Error)]
pub enum ModelError {
    /// An entity with the same identity or unique attributes exists.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// An identifier is not valid for the store's key type.
    #[error("invalid id {id:?}: {reason}")]
    InvalidId {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The store does not support the request.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A request argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Engine error.
    #[error(transparent)]
    Core(CoreError),
}

impl ModelError {
    /// Creates a duplicate error.
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate(message.into())
    }

    /// Creates a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<CoreError> for ModelError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateKey { kind, key } => {
                Self::Duplicate(format!("{kind} already contains {key}"))
            }
            CoreError::InvalidKey { id, reason } => Self::InvalidId { id, reason },
            other => Self::Core(other),
        }
    }
}

impl From<ModelError> for CoreError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Core(inner) => inner,
            ModelError::InvalidId { id, reason } => CoreError::InvalidKey { id, reason },
            other => CoreError::invalid_operation(other.to_string()),
        }
    }
}
