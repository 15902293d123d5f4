//! Narrow seam over the `yrs` CRDT engine.
//!
//! Everything the crate needs from the engine passes through this module:
//! transaction acquisition primitives, state-vector and update codecs, the
//! root table, node addressing, and the two native observation hooks. The
//! merge algorithm itself is entirely the engine's business.

use std::sync::Arc;

use yrs::{
    Doc, Options, StateVector, Transact, TransactionAcqError, Update,
    updates::{decoder::Decode, encoder::Encode},
};

use crate::{
    document::DocumentError,
    events::{CommitEvent, SubdocsEvent},
    transaction::{Origin, TransactionError},
};

// Engine vocabulary consumed by the transaction and shared-type modules.
// Keeping these re-exports here means no other module names `yrs` directly.
pub(crate) use yrs::{
    Any, Array as ArrayOps, ArrayPrelim, ArrayRef, Doc as EngineDoc, GetString, Map as MapOps,
    MapPrelim, MapRef, Origin as EngineOrigin, Out, ReadTxn, Text as TextOps, TextPrelim, TextRef,
    branch::Branch,
};

/// Engine-level read transaction.
pub(crate) type ReadTxnInner<'doc> = yrs::Transaction<'doc>;
/// Engine-level write transaction.
pub(crate) type WriteTxnInner<'doc> = yrs::TransactionMut<'doc>;
/// RAII guard for a native observation callback.
pub(crate) type EngineSubscription = yrs::Subscription;
/// Stable engine-assigned address of one node inside the document tree.
pub(crate) type NodeId = yrs::BranchID;

/// Globally unique identifier of a document.
///
/// Assigned by the engine at document creation and stable for the document's
/// lifetime; together with a node's branch identifier it keys the identity
/// cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocGuid(Arc<str>);

impl DocGuid {
    fn from_engine(guid: yrs::Uuid) -> Self {
        DocGuid(Arc::from(guid.to_string().as_str()))
    }

    /// The GUID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owned handle to the engine state of one document.
///
/// Cloning the inner `Doc` is shallow; `doc_handle()` hands out such clones
/// for subdocument insertion.
#[derive(Debug)]
pub(crate) struct Engine {
    doc: Doc,
}

impl Engine {
    pub(crate) fn new(client_id: Option<u64>) -> Self {
        let doc = match client_id {
            Some(id) => Doc::with_options(Options::with_client_id(id)),
            None => Doc::new(),
        };
        Engine { doc }
    }

    /// Wrap an existing engine document, e.g. a subdocument read back out of
    /// a container.
    pub(crate) fn from_doc(doc: Doc) -> Self {
        Engine { doc }
    }

    pub(crate) fn guid(&self) -> DocGuid {
        DocGuid::from_engine(self.doc.guid())
    }

    pub(crate) fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Shallow clone of the native document, used to insert it as a
    /// subdocument value.
    pub(crate) fn doc_handle(&self) -> Doc {
        self.doc.clone()
    }

    /// Acquire an engine read transaction.
    ///
    /// The coordinator serializes all engine transactions behind the write
    /// slot, so acquisition failure here means the slot discipline was
    /// bypassed and is surfaced as a conflict.
    pub(crate) fn try_read(&self) -> Result<ReadTxnInner<'_>, TransactionError> {
        self.doc.try_transact().map_err(acq_error)
    }

    /// Acquire an engine write transaction, tagged with `origin` when given.
    pub(crate) fn try_write(
        &self,
        origin: Option<&Origin>,
    ) -> Result<WriteTxnInner<'_>, TransactionError> {
        match origin {
            Some(origin) => self
                .doc
                .try_transact_mut_with(origin.to_engine())
                .map_err(acq_error),
            None => self.doc.try_transact_mut().map_err(acq_error),
        }
    }

    /// Register a native callback fired once per committed write transaction,
    /// carrying the binary update that transaction produced.
    pub(crate) fn observe_commits<F>(&self, f: F) -> Result<EngineSubscription, TransactionError>
    where
        F: Fn(CommitEvent) + Send + Sync + 'static,
    {
        self.doc
            .observe_update_v1(move |txn, event| {
                f(CommitEvent {
                    update: event.update.clone(),
                    origin: txn.origin().map(Origin::from_engine),
                })
            })
            .map_err(acq_error)
    }

    /// Register a native callback fired when subdocuments are added, removed
    /// or loaded.
    pub(crate) fn observe_subdocs<F>(&self, f: F) -> Result<EngineSubscription, TransactionError>
    where
        F: Fn(SubdocsEvent) + Send + Sync + 'static,
    {
        self.doc
            .observe_subdocs(move |_txn, event| {
                f(SubdocsEvent {
                    added: event.added().map(|d| DocGuid::from_engine(d.guid())).collect(),
                    removed: event
                        .removed()
                        .map(|d| DocGuid::from_engine(d.guid()))
                        .collect(),
                    loaded: event
                        .loaded()
                        .map(|d| DocGuid::from_engine(d.guid()))
                        .collect(),
                })
            })
            .map_err(acq_error)
    }
}

fn acq_error(err: TransactionAcqError) -> TransactionError {
    TransactionError::Conflict {
        reason: err.to_string(),
    }
}

/// Encode the state vector visible to `txn`.
pub(crate) fn state_vector<T: ReadTxn>(txn: &T) -> Vec<u8> {
    txn.state_vector().encode_v1()
}

/// Encode the update that brings a replica at `state` up to `txn`'s state.
/// `None` stands for the empty state vector, i.e. the full document history.
pub(crate) fn update_since<T: ReadTxn>(
    txn: &T,
    state: Option<&[u8]>,
) -> Result<Vec<u8>, DocumentError> {
    let sv = match state {
        Some(bytes) => StateVector::decode_v1(bytes).map_err(|err| {
            DocumentError::MalformedState {
                reason: err.to_string(),
            }
        })?,
        None => StateVector::default(),
    };
    Ok(txn.encode_state_as_update_v1(&sv))
}

/// Decode and merge `update` into the document under `txn`.
pub(crate) fn apply_update(
    txn: &mut WriteTxnInner<'_>,
    update: &[u8],
) -> Result<(), DocumentError> {
    let decoded = Update::decode_v1(update).map_err(|err| DocumentError::MalformedUpdate {
        reason: err.to_string(),
    })?;
    txn.apply_update(decoded)
        .map_err(|err| DocumentError::MergeFailed {
            reason: err.to_string(),
        })
}

/// Snapshot of the root table: name to node handle.
pub(crate) fn roots<T: ReadTxn>(txn: &T) -> Vec<(String, Out)> {
    txn.root_refs()
        .map(|(name, out)| (name.to_string(), out))
        .collect()
}

/// The stable branch identifier of a node handle.
pub(crate) fn node_id<N: AsRef<Branch>>(node: &N) -> NodeId {
    node.as_ref().id()
}

/// Get or create the named root as a map node.
pub(crate) fn root_map(txn: &mut WriteTxnInner<'_>, name: &str) -> MapRef {
    use yrs::WriteTxn;
    txn.get_or_insert_map(name)
}

/// Get or create the named root as a sequence node.
pub(crate) fn root_array(txn: &mut WriteTxnInner<'_>, name: &str) -> ArrayRef {
    use yrs::WriteTxn;
    txn.get_or_insert_array(name)
}

/// Get or create the named root as a text node.
pub(crate) fn root_text(txn: &mut WriteTxnInner<'_>, name: &str) -> TextRef {
    use yrs::WriteTxn;
    txn.get_or_insert_text(name)
}
