//! Error types for mapstore core.

use crate::criteria::Operator;
use crate::types::{TransactionId, TransactionState};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in mapstore core operations.
///
/// Keys are carried in their debug rendering so the error type stays free
/// of the engine's generic key parameter.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend error, passed through unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] mapstore_storage::StorageError),

    /// An entity already exists under the key, or a caller-side uniqueness
    /// check found a conflicting entity.
    #[error("duplicate key in {kind}: {key}")]
    DuplicateKey {
        /// Entity kind.
        kind: String,
        /// The conflicting key or constraint description.
        key: String,
    },

    /// An external identifier could not be converted into a key.
    #[error("invalid key {id:?}: {reason}")]
    InvalidKey {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A criteria leaf used a field/operator/operand combination the
    /// entity kind does not support.
    #[error("unsupported filter {operator} on field {field}: {reason}")]
    UnsupportedFilter {
        /// Field name.
        field: &'static str,
        /// Operator used.
        operator: Operator,
        /// Why the combination was rejected.
        reason: String,
    },

    /// An operation was attempted on a transaction that already completed.
    #[error("{txid} is closed ({state:?})")]
    TransactionClosed {
        /// The transaction.
        txid: TransactionId,
        /// Its terminal state.
        state: TransactionState,
    },

    /// An update targeted a key that is pending deletion in the same
    /// transaction.
    #[error("entity {key} in {kind} was removed in this transaction")]
    KeyRemoved {
        /// Entity kind.
        kind: String,
        /// The removed key.
        key: String,
    },

    /// No entity exists under the key.
    #[error("entity {key} not found in {kind}")]
    NotFound {
        /// Entity kind.
        kind: String,
        /// The missing key.
        key: String,
    },

    /// An entity's own identity key disagrees with the key it is stored
    /// under.
    #[error("identity mismatch in {kind}: stored under {expected}, entity reports {actual}")]
    IdentityMismatch {
        /// Entity kind.
        kind: String,
        /// Key the entity is stored under.
        expected: String,
        /// Key the entity reports.
        actual: String,
    },

    /// A key converter cannot produce another fresh key.
    #[error("key space exhausted: {reason}")]
    KeysExhausted {
        /// Why no key is left.
        reason: String,
    },

    /// The unit of work was rolled back instead of committed.
    #[error("unit of work aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Operation not permitted in the current lifecycle state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unsupported filter error.
    pub fn unsupported_filter(
        field: &'static str,
        operator: Operator,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedFilter {
            field,
            operator,
            reason: reason.into(),
        }
    }

    /// Creates a key space exhausted error.
    pub fn keys_exhausted(reason: impl Into<String>) -> Self {
        Self::KeysExhausted {
            reason: reason.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for the errors a domain adapter is expected to surface
    /// to its own callers as a request error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. } | Self::InvalidKey { .. })
    }
}
