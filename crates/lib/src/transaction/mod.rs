//! Transaction system for scoped document access
//!
//! Every operation against a document's engine state happens inside a
//! [`Transaction`]: a guard that owns the per-document coordination slot and
//! an engine-level transaction token for the duration of one scope. Dropping
//! the guard commits the engine transaction (firing change notifications)
//! and then releases the slot, on every exit path.
//!
//! Acquisition is arbitrated by the [`slot::WriteSlot`]: synchronous callers
//! either take the free slot, block FIFO-fairly (multithreaded documents),
//! or fail fast with a conflict (single-threaded documents); cooperative
//! callers suspend at an await point instead. Nested reuse within one
//! control flow is expressed by passing the guard down and checking origin
//! compatibility with [`Transaction::nested`].

pub mod errors;
pub(crate) mod slot;

use std::fmt;

pub use errors::TransactionError;

use crate::{
    document::DocumentError,
    engine::{self, DocGuid, EngineOrigin, Out, ReadTxnInner, WriteTxnInner},
};
pub(crate) use slot::SlotPermit;

/// Opaque caller-supplied tag correlating the mutations of one transaction.
///
/// Origins travel with the transaction into the engine, come back out on
/// commit events, and gate nested reuse: a nested scope asking for a
/// different origin than the active transaction is a protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(EngineOrigin);

impl Origin {
    pub(crate) fn from_engine(origin: &EngineOrigin) -> Self {
        Origin(origin.clone())
    }

    pub(crate) fn to_engine(&self) -> EngineOrigin {
        self.0.clone()
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Origin(EngineOrigin::from(value))
    }
}

impl From<String> for Origin {
    fn from(value: String) -> Self {
        Origin(EngineOrigin::from(value.as_str()))
    }
}

impl From<u64> for Origin {
    fn from(value: u64) -> Self {
        Origin(EngineOrigin::from(value.to_string().as_str()))
    }
}

impl From<i64> for Origin {
    fn from(value: i64) -> Self {
        Origin(EngineOrigin::from(value.to_string().as_str()))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: &[u8] = self.0.as_ref();
        match std::str::from_utf8(bytes) {
            Ok(text) => f.write_str(text),
            Err(_) => write!(f, "{bytes:02x?}"),
        }
    }
}

pub(crate) fn fmt_origin(origin: Option<&Origin>) -> String {
    origin
        .map(|origin| origin.to_string())
        .unwrap_or_else(|| "<none>".to_owned())
}

/// Engine transaction token held by a [`Transaction`].
pub(crate) enum TxnKind<'doc> {
    Read(ReadTxnInner<'doc>),
    Write(WriteTxnInner<'doc>),
}

/// Dispatch a read-side engine call over either transaction kind.
macro_rules! with_read_txn {
    ($txn:expr, |$t:ident| $body:expr) => {
        match $txn.kind() {
            $crate::transaction::TxnKind::Read($t) => $body,
            $crate::transaction::TxnKind::Write($t) => $body,
        }
    };
}
pub(crate) use with_read_txn;

/// A scoped handle granting access to a document's engine state.
///
/// Field order matters: the engine transaction commits (and delivers change
/// notifications) before the coordination slot is released.
pub struct Transaction<'doc> {
    inner: TxnKind<'doc>,
    #[allow(dead_code)]
    permit: SlotPermit,
    origin: Option<Origin>,
    guid: DocGuid,
}

impl<'doc> Transaction<'doc> {
    pub(crate) fn write(
        permit: SlotPermit,
        inner: WriteTxnInner<'doc>,
        origin: Option<Origin>,
        guid: DocGuid,
    ) -> Self {
        Transaction {
            inner: TxnKind::Write(inner),
            permit,
            origin,
            guid,
        }
    }

    pub(crate) fn read(permit: SlotPermit, inner: ReadTxnInner<'doc>, guid: DocGuid) -> Self {
        Transaction {
            inner: TxnKind::Read(inner),
            permit,
            origin: None,
            guid,
        }
    }

    /// GUID of the document this transaction belongs to.
    pub(crate) fn doc_guid(&self) -> &DocGuid {
        &self.guid
    }

    /// The origin this transaction was opened with.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Whether mutations are permitted under this transaction.
    pub fn is_writable(&self) -> bool {
        matches!(self.inner, TxnKind::Write(_))
    }

    /// Reuse this transaction from a nested scope.
    ///
    /// Returns the same transaction after checking origin compatibility:
    /// asking for an origin that differs from the active one (including an
    /// unset active origin) fails with
    /// [`TransactionError::IncompatibleOrigin`]. Asking for no origin always
    /// succeeds.
    pub fn nested(&mut self, origin: Option<&Origin>) -> Result<&mut Self, TransactionError> {
        if let Some(requested) = origin
            && self.origin.as_ref() != Some(requested)
        {
            return Err(TransactionError::IncompatibleOrigin {
                active: fmt_origin(self.origin.as_ref()),
                requested: requested.to_string(),
            });
        }
        Ok(self)
    }

    /// Commit the transaction, releasing the coordination slot.
    ///
    /// Equivalent to dropping the guard; provided for explicit call sites.
    pub fn commit(self) {}

    pub(crate) fn kind(&self) -> &TxnKind<'doc> {
        &self.inner
    }

    /// Mutable access to the engine write transaction, rejecting read-only
    /// guards before any engine contact.
    pub(crate) fn writable(&mut self) -> Result<&mut WriteTxnInner<'doc>, TransactionError> {
        match &mut self.inner {
            TxnKind::Write(txn) => Ok(txn),
            TxnKind::Read(_) => Err(TransactionError::ReadOnly),
        }
    }

    /// Encoded state vector visible to this transaction.
    pub fn state(&self) -> Vec<u8> {
        with_read_txn!(self, |txn| engine::state_vector(txn))
    }

    /// Encoded update from `state` (or document creation) to this
    /// transaction's state.
    pub fn update_since(&self, state: Option<&[u8]>) -> Result<Vec<u8>, DocumentError> {
        with_read_txn!(self, |txn| engine::update_since(txn, state))
    }

    pub(crate) fn roots_out(&self) -> Vec<(String, Out)> {
        with_read_txn!(self, |txn| engine::roots(txn))
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("writable", &self.is_writable())
            .field("origin", &self.origin)
            .finish()
    }
}
