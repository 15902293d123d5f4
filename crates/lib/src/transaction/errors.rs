//! Transaction specific errors
//!
//! This module contains error types for transaction acquisition and use:
//! origin mismatches on nested reuse, acquisition timeouts, read-only
//! violations and illegal re-entrancy.

use thiserror::Error;

/// Errors that can occur while acquiring or using a transaction
///
/// `TransactionError` covers the coordination protocol only. Failures inside
/// the engine while a transaction is held surface as
/// [`DocumentError`](crate::document::DocumentError) instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Nested transaction requested with a different origin than the active one
    #[error("nested transaction origin `{requested}` does not match active origin `{active}`")]
    IncompatibleOrigin {
        /// Origin of the currently active transaction, `<none>` when unset
        active: String,
        /// Origin the nested caller asked for
        requested: String,
    },

    /// A new transaction could not be acquired within the requested timeout
    #[error("could not acquire transaction within {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    /// A mutation was attempted while holding a read-only transaction
    #[error("transaction is read-only")]
    ReadOnly,

    /// Illegal acquisition: re-entrancy on the holding thread, or a blocking
    /// acquisition that would deadlock with multithreading disabled
    #[error("transaction conflict: {reason}")]
    Conflict { reason: String },
}

impl TransactionError {
    /// Check if this error indicates an origin mismatch on nested reuse
    pub fn is_incompatible_origin(&self) -> bool {
        matches!(self, TransactionError::IncompatibleOrigin { .. })
    }

    /// Check if this error indicates an acquisition timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransactionError::Timeout { .. })
    }

    /// Check if this error indicates a rejected mutation under a read-only transaction
    pub fn is_read_only(&self) -> bool {
        matches!(self, TransactionError::ReadOnly)
    }

    /// Check if this error indicates illegal re-entrancy or a deadlock precondition
    pub fn is_conflict(&self) -> bool {
        matches!(self, TransactionError::Conflict { .. })
    }
}

// Conversion from TransactionError to the main Error type
impl From<TransactionError> for crate::Error {
    fn from(err: TransactionError) -> Self {
        crate::Error::Transaction(err)
    }
}
