//! Document specific errors
//!
//! Errors raised by the document façade: root-table access, update
//! application and the optional validation hook.

use thiserror::Error;

/// Errors that can occur during document-level operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Root names must be non-empty strings
    #[error("root name must be a non-empty string")]
    InvalidRootKey,

    /// A root was read by name but does not exist
    #[error("no root named '{name}'")]
    RootNotFound { name: String },

    /// A root exists but is not of the requested shared type
    #[error("root '{name}' is not a {expected}")]
    RootTypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// The update bytes could not be decoded
    #[error("malformed update: {reason}")]
    MalformedUpdate { reason: String },

    /// The state vector bytes could not be decoded
    #[error("malformed state vector: {reason}")]
    MalformedState { reason: String },

    /// The engine rejected an otherwise well-formed update
    #[error("update could not be merged: {reason}")]
    MergeFailed { reason: String },

    /// The configured validator rejected an applied update
    #[error("update rejected by validator: {reason}")]
    Validation { reason: String },
}

impl DocumentError {
    /// Check if this error indicates a missing root
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::RootNotFound { .. })
    }

    /// Check if this error indicates malformed update or state bytes
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DocumentError::MalformedUpdate { .. } | DocumentError::MalformedState { .. }
        )
    }

    /// Check if this error came from the validation hook
    pub fn is_validation(&self) -> bool {
        matches!(self, DocumentError::Validation { .. })
    }

    /// Check if this error is a root-key or root-type usage error
    pub fn is_root_error(&self) -> bool {
        matches!(
            self,
            DocumentError::InvalidRootKey
                | DocumentError::RootNotFound { .. }
                | DocumentError::RootTypeMismatch { .. }
        )
    }
}

// Conversion from DocumentError to the main Error type
impl From<DocumentError> for crate::Error {
    fn from(err: DocumentError) -> Self {
        crate::Error::Document(err)
    }
}
