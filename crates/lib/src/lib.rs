//!
//! Chorus: transaction coordination, identity caching and change streaming
//! for collaborative documents.
//!
//! Chorus sits on top of a conflict-free replicated document engine (the
//! `yrs` CRDT) and manages everything around the merge algorithm rather than
//! the merge algorithm itself:
//!
//! * **Transactions (`transaction`)**: scoped guards granting access to a
//!   document's engine state. One write transaction per document at a time;
//!   contended acquisitions either queue fairly across threads, suspend
//!   cooperatively at an await point, or fail fast, depending on how the
//!   document was built. Read-only guards reject mutations outright.
//! * **Identity (`identity`)**: a process-wide cache guaranteeing that
//!   repeated lookups of the same document node hand back the same wrapper
//!   object, without keeping unreferenced wrappers alive.
//! * **Events (`events`)**: the engine's synchronous change callbacks fanned
//!   out to any number of independently-paced asynchronous streams, with
//!   non-blocking delivery and automatic cleanup of abandoned streams.
//! * **Documents (`document`)**: the façade composing the above: root
//!   access, update and state-vector exchange, observers, event streams,
//!   snapshot serialization and an optional update-validation hook.
//! * **Shared types (`shared`)**: `Map`, `Array` and `Text` wrappers over
//!   the engine's collaborative nodes, with preliminary (detached) state
//!   that integrates recursively on insertion.
//!
//! ```
//! use chorus::{Document, Map};
//!
//! let doc = Document::new();
//! let config = doc.get_or_insert::<Map>("config").unwrap();
//!
//! let mut txn = doc.transaction(Some("setup".into())).unwrap();
//! config.insert(&mut txn, "answer", 42).unwrap();
//! txn.commit();
//!
//! let txn = doc.read_transaction().unwrap();
//! assert_eq!(config.get(&txn, "answer").unwrap().as_int(), Some(42));
//! ```

pub mod document;
pub mod events;
pub mod shared;
pub mod transaction;

pub(crate) mod engine;
pub(crate) mod identity;

pub use document::{
    Document, DocumentBuilder, DocumentError, DocumentSnapshot, ObserverId, UpdateValidator,
};
pub use engine::DocGuid;
pub use events::{CommitEvent, EventStream, SubdocsEvent};
pub use shared::{Array, Map, RootKind, SharedType, SharedTypeError, Text, Value};
pub use transaction::{Origin, Transaction, TransactionError};

/// Result type used throughout the Chorus library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Chorus library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured transaction errors from the transaction module
    #[error(transparent)]
    Transaction(TransactionError),

    /// Structured document errors from the document module
    #[error(transparent)]
    Document(DocumentError),

    /// Structured shared-type errors from the shared module
    #[error(transparent)]
    Shared(SharedTypeError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Transaction(_) => "transaction",
            Error::Document(_) => "document",
            Error::Shared(_) => "shared",
        }
    }

    /// Check if this error indicates an origin mismatch on nested reuse.
    pub fn is_incompatible_origin(&self) -> bool {
        match self {
            Error::Transaction(err) => err.is_incompatible_origin(),
            _ => false,
        }
    }

    /// Check if this error indicates a transaction acquisition timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Transaction(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error indicates a rejected mutation under a read-only
    /// transaction.
    pub fn is_read_only(&self) -> bool {
        match self {
            Error::Transaction(err) => err.is_read_only(),
            _ => false,
        }
    }

    /// Check if this error indicates illegal transaction re-entrancy or a
    /// deadlock precondition violation.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Transaction(err) => err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error indicates a missing root, key or index.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Document(err) => err.is_not_found(),
            Error::Shared(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error came from the update-validation hook.
    pub fn is_validation(&self) -> bool {
        match self {
            Error::Document(err) => err.is_validation(),
            _ => false,
        }
    }

    /// Check if this error indicates malformed update or state bytes.
    pub fn is_malformed(&self) -> bool {
        match self {
            Error::Document(err) => err.is_malformed(),
            _ => false,
        }
    }
}
