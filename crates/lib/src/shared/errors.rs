//! Shared type specific errors
//!
//! Errors raised by operations on the `Map`, `Array` and `Text` wrappers.

use thiserror::Error;

/// Errors that can occur during shared type operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SharedTypeError {
    /// The wrapper has not been integrated into a document yet
    #[error("node is not integrated into a document")]
    Detached,

    /// The wrapper is already integrated and cannot be inserted again
    #[error("node is already integrated into a document")]
    AlreadyIntegrated,

    /// Map lookup failed
    #[error("key '{key}' not found")]
    KeyNotFound { key: String },

    /// Array index out of bounds
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: u32, len: u32 },

    /// A value of one shared type was read as another
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl SharedTypeError {
    /// Check if this error indicates a missing key or index
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SharedTypeError::KeyNotFound { .. } | SharedTypeError::IndexOutOfBounds { .. }
        )
    }

    /// Check if this error indicates a shared-type mismatch
    pub fn is_type_error(&self) -> bool {
        matches!(self, SharedTypeError::TypeMismatch { .. })
    }

    /// Check if this error is about wrapper integration state
    pub fn is_integration_error(&self) -> bool {
        matches!(
            self,
            SharedTypeError::Detached | SharedTypeError::AlreadyIntegrated
        )
    }
}

// Conversion from SharedTypeError to the main Error type
impl From<SharedTypeError> for crate::Error {
    fn from(err: SharedTypeError) -> Self {
        crate::Error::Shared(err)
    }
}
