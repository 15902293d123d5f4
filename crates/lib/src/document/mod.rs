//! Document façade.
//!
//! A [`Document`] composes the engine seam, the transaction coordinator, the
//! identity cache and the event bus into the public surface: root access,
//! transaction entry points, update and state-vector exchange, observer
//! callbacks, asynchronous event streams and snapshot serialization.
//!
//! `Document` is a cheap handle: clones share the same underlying state.
//! At most one write transaction is active against a document at any
//! instant; with multithreading enabled, contending threads queue fairly,
//! otherwise contention is a programmer error surfaced as a conflict.

pub mod errors;
mod snapshot;

use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::warn;

pub use errors::DocumentError;
pub use snapshot::DocumentSnapshot;

use crate::{
    Result,
    engine::{self, DocGuid, Engine, EngineDoc, EngineSubscription, Out},
    events::{CommitEvent, EventStream, StreamSet, SubdocsEvent},
    identity::identity_cache,
    shared::{Array, Map, RootKind, SharedType, Text, Value, node},
    transaction::{Origin, SlotPermit, Transaction, TransactionError, slot::WriteSlot},
};

/// Identifier of an observer callback registered with
/// [`Document::observe`] or [`Document::observe_subdocs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Validation hook consulted before an update is committed to the primary
/// document.
///
/// When configured, the document maintains a twin: the candidate update is
/// applied to the twin first and the hook inspects the result. On rejection
/// the twin is rebuilt from the primary's current state and the update never
/// reaches the primary.
pub trait UpdateValidator: Send + Sync {
    /// Inspect the twin after the candidate update has been applied to it.
    /// Returning an error rejects the update with the given reason.
    ///
    /// The hook must confine itself to the document it is given; touching
    /// the primary document from here deadlocks.
    fn validate(&self, doc: &Document) -> std::result::Result<(), String>;
}

/// A shared document.
///
/// All shared types live within the scope of their document, all updates are
/// produced per document, and all operations on shared types happen inside a
/// transaction whose lifetime is bound to the document.
#[derive(Clone)]
pub struct Document {
    shared: Arc<DocShared>,
}

struct DocShared {
    engine: Engine,
    guid: DocGuid,
    slot: Arc<WriteSlot>,
    multithreading: bool,
    observers: Mutex<ObserverRegistry>,
    commit_streams: Arc<StreamSet<CommitEvent>>,
    subdoc_streams: Arc<StreamSet<SubdocsEvent>>,
    validator: Option<Arc<dyn UpdateValidator>>,
    twin: Mutex<Option<Document>>,
}

#[derive(Default)]
struct ObserverRegistry {
    next_id: u64,
    entries: Vec<(u64, EngineSubscription)>,
}

impl Drop for DocShared {
    fn drop(&mut self) {
        identity_cache().purge_document(&self.guid);
    }
}

impl Document {
    /// Create a document with default options: engine-assigned client id,
    /// multithreading disabled, no validation hook.
    pub fn new() -> Self {
        Self::construct(None, false, None)
    }

    /// Start building a document with explicit options.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    fn construct(
        client_id: Option<u64>,
        multithreading: bool,
        validator: Option<Arc<dyn UpdateValidator>>,
    ) -> Self {
        let engine = Engine::new(client_id);
        let guid = engine.guid();
        Document {
            shared: Arc::new(DocShared {
                engine,
                guid,
                slot: WriteSlot::new(),
                multithreading,
                observers: Mutex::new(ObserverRegistry::default()),
                commit_streams: StreamSet::new("commit"),
                subdoc_streams: StreamSet::new("subdocs"),
                validator,
                twin: Mutex::new(None),
            }),
        }
    }

    /// Wrap an engine document read back out of a container as a
    /// subdocument handle.
    pub(crate) fn from_engine_doc(doc: EngineDoc) -> Self {
        let engine = Engine::from_doc(doc);
        let guid = engine.guid();
        Document {
            shared: Arc::new(DocShared {
                engine,
                guid,
                slot: WriteSlot::new(),
                multithreading: false,
                observers: Mutex::new(ObserverRegistry::default()),
                commit_streams: StreamSet::new("commit"),
                subdoc_streams: StreamSet::new("subdocs"),
                validator: None,
                twin: Mutex::new(None),
            }),
        }
    }

    /// The document's globally unique identifier.
    pub fn guid(&self) -> DocGuid {
        self.shared.guid.clone()
    }

    /// The document's client id.
    pub fn client_id(&self) -> u64 {
        self.shared.engine.client_id()
    }

    /// Whether `self` and `other` are handles to the same document.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn engine_doc(&self) -> EngineDoc {
        self.shared.engine.doc_handle()
    }

    pub(crate) fn expect_same_doc(
        &self,
        txn: &Transaction<'_>,
    ) -> std::result::Result<(), TransactionError> {
        if txn.doc_guid() == &self.shared.guid {
            Ok(())
        } else {
            Err(TransactionError::Conflict {
                reason: "transaction belongs to a different document".to_owned(),
            })
        }
    }

    fn acquire_slot_sync(
        &self,
        timeout: Option<Duration>,
    ) -> std::result::Result<SlotPermit, TransactionError> {
        if let Some(permit) = self.shared.slot.try_acquire() {
            return Ok(permit);
        }
        if self.shared.slot.held_by_current_thread() {
            return Err(TransactionError::Conflict {
                reason: "document is already in a transaction on this thread".to_owned(),
            });
        }
        if !self.shared.multithreading {
            return Err(TransactionError::Conflict {
                reason: "document is already in a transaction and multithreading is disabled"
                    .to_owned(),
            });
        }
        self.shared.slot.acquire_blocking(timeout)
    }

    fn open_write(&self, permit: SlotPermit, origin: Option<Origin>) -> Result<Transaction<'_>> {
        let inner = self.shared.engine.try_write(origin.as_ref())?;
        Ok(Transaction::write(
            permit,
            inner,
            origin,
            self.shared.guid.clone(),
        ))
    }

    /// Open a write transaction, tagged with `origin` when given.
    ///
    /// With multithreading enabled this blocks (fairly, FIFO) while another
    /// thread holds the document's transaction; otherwise a held slot is a
    /// programmer error surfaced as [`TransactionError::Conflict`]. Within
    /// one control flow, pass the returned guard down and reuse it via
    /// [`Transaction::nested`].
    pub fn transaction(&self, origin: Option<Origin>) -> Result<Transaction<'_>> {
        let permit = self.acquire_slot_sync(None)?;
        self.open_write(permit, origin)
    }

    /// Like [`Document::transaction`], giving up with
    /// [`TransactionError::Timeout`] when the slot cannot be acquired within
    /// `timeout`.
    pub fn transaction_with_timeout(
        &self,
        origin: Option<Origin>,
        timeout: Duration,
    ) -> Result<Transaction<'_>> {
        let permit = self.acquire_slot_sync(Some(timeout))?;
        self.open_write(permit, origin)
    }

    /// Open a write transaction, blocking the calling thread until the
    /// current holder releases or `timeout` elapses.
    ///
    /// Never reuses an ongoing transaction. Requires multithreading when the
    /// slot is contended: blocking here with multithreading disabled is a
    /// deadlock precondition violation and fails fast with a conflict.
    pub fn new_transaction_blocking(
        &self,
        origin: Option<Origin>,
        timeout: Option<Duration>,
    ) -> Result<Transaction<'_>> {
        let permit = self.acquire_slot_sync(timeout)?;
        self.open_write(permit, origin)
    }

    /// Open a write transaction, suspending the calling task until the
    /// current holder releases or `timeout` elapses.
    ///
    /// Never reuses an ongoing transaction. Correct in both threading modes:
    /// the holder runs on a different cooperative turn (or thread), so
    /// suspension is safe where blocking would deadlock. The timeout is
    /// honored via a scheduled wakeup regardless of threading mode.
    pub async fn new_transaction(
        &self,
        origin: Option<Origin>,
        timeout: Option<Duration>,
    ) -> Result<Transaction<'_>> {
        let permit = match self.shared.slot.try_acquire() {
            Some(permit) => permit,
            None => self.shared.slot.acquire(timeout).await?,
        };
        self.open_write(permit, origin)
    }

    /// Open a read-only transaction. Mutation attempts under it fail with
    /// [`TransactionError::ReadOnly`] before reaching the engine.
    pub fn read_transaction(&self) -> Result<Transaction<'_>> {
        let permit = self.acquire_slot_sync(None)?;
        let inner = self.shared.engine.try_read()?;
        Ok(Transaction::read(permit, inner, self.shared.guid.clone()))
    }

    /// Run `f` inside a write transaction, committing on success and
    /// releasing the slot on every exit path.
    pub fn with_transaction<R>(
        &self,
        origin: Option<Origin>,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut txn = self.transaction(origin)?;
        let result = f(&mut txn)?;
        txn.commit();
        Ok(result)
    }

    fn validate_root_name(name: &str) -> std::result::Result<(), DocumentError> {
        if name.is_empty() {
            Err(DocumentError::InvalidRootKey)
        } else {
            Ok(())
        }
    }

    /// Assign a detached shared value to the named root, integrating its
    /// preliminary state. Re-assigning an existing root merges content under
    /// the engine's semantics.
    pub fn insert<T: SharedType>(&self, name: &str, value: &T) -> Result<()> {
        let mut txn = self.transaction(None)?;
        self.insert_in(&mut txn, name, value)?;
        txn.commit();
        Ok(())
    }

    /// [`Document::insert`] inside an already-held transaction.
    pub fn insert_in<T: SharedType>(
        &self,
        txn: &mut Transaction<'_>,
        name: &str,
        value: &T,
    ) -> Result<()> {
        Self::validate_root_name(name)?;
        self.expect_same_doc(txn)?;
        let write = txn.writable()?;
        node::integrate_root(self, write, name, value.handle())?;
        Ok(())
    }

    /// Get the named root as type `T`, creating it when absent.
    pub fn get_or_insert<T: SharedType>(&self, name: &str) -> Result<T> {
        let mut txn = self.transaction(None)?;
        let root = self.get_or_insert_in::<T>(&mut txn, name)?;
        txn.commit();
        Ok(root)
    }

    /// [`Document::get_or_insert`] inside an already-held transaction.
    pub fn get_or_insert_in<T: SharedType>(
        &self,
        txn: &mut Transaction<'_>,
        name: &str,
    ) -> Result<T> {
        Self::validate_root_name(name)?;
        self.expect_same_doc(txn)?;
        let existing = txn
            .roots_out()
            .into_iter()
            .find(|(root_name, _)| root_name == name)
            .and_then(|(_, out)| out_kind(&out));
        if let Some(kind) = existing
            && kind != T::kind()
        {
            return Err(DocumentError::RootTypeMismatch {
                name: name.to_owned(),
                expected: T::kind().type_name(),
            }
            .into());
        }
        let write = txn.writable()?;
        let engine_node = match T::kind() {
            RootKind::Map => node::EngineNode::Map(engine::root_map(write, name)),
            RootKind::Array => node::EngineNode::Array(engine::root_array(write, name)),
            RootKind::Text => node::EngineNode::Text(engine::root_text(write, name)),
        };
        Ok(T::from_handle(node::wrap_node(self, engine_node)))
    }

    /// Get the named root, failing with [`DocumentError::RootNotFound`] when
    /// absent.
    pub fn get(&self, name: &str) -> Result<Value> {
        let txn = self.read_transaction()?;
        self.get_in(&txn, name)
    }

    /// [`Document::get`] inside an already-held transaction.
    pub fn get_in(&self, txn: &Transaction<'_>, name: &str) -> Result<Value> {
        self.expect_same_doc(txn)?;
        for (root_name, out) in txn.roots_out() {
            if root_name == name {
                return Ok(node::out_to_value(self, out));
            }
        }
        Err(DocumentError::RootNotFound {
            name: name.to_owned(),
        }
        .into())
    }

    /// Names of the document's roots.
    pub fn keys(&self) -> Result<Vec<String>> {
        let txn = self.read_transaction()?;
        self.keys_in(&txn)
    }

    /// [`Document::keys`] inside an already-held transaction.
    pub fn keys_in(&self, txn: &Transaction<'_>) -> Result<Vec<String>> {
        self.expect_same_doc(txn)?;
        Ok(txn.roots_out().into_iter().map(|(name, _)| name).collect())
    }

    /// Root name-value pairs, resolved through the identity cache.
    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        let txn = self.read_transaction()?;
        self.items_in(&txn)
    }

    /// [`Document::items`] inside an already-held transaction.
    pub fn items_in(&self, txn: &Transaction<'_>) -> Result<Vec<(String, Value)>> {
        self.expect_same_doc(txn)?;
        Ok(txn
            .roots_out()
            .into_iter()
            .map(|(name, out)| {
                let value = node::out_to_value(self, out);
                (name, value)
            })
            .collect())
    }

    /// Root values, resolved through the identity cache.
    pub fn values(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }

    /// The document's current encoded state vector.
    pub fn get_state(&self) -> Result<Vec<u8>> {
        Ok(self.read_transaction()?.state())
    }

    /// The encoded update from `state` (or from document creation when
    /// `None`) to the document's current state.
    pub fn get_update(&self, state: Option<&[u8]>) -> Result<Vec<u8>> {
        let txn = self.read_transaction()?;
        Ok(txn.update_since(state)?)
    }

    /// Merge a binary update into the document.
    ///
    /// When a validation hook is configured the update is applied to the
    /// twin and validated first; rejection leaves the primary untouched.
    pub fn apply_update(&self, update: &[u8]) -> Result<()> {
        if self.shared.validator.is_some() {
            self.run_twin_validation(update, None)?;
        }
        let mut txn = self.transaction(None)?;
        engine::apply_update(txn.writable()?, update)?;
        txn.commit();
        Ok(())
    }

    /// [`Document::apply_update`] inside an already-held transaction.
    pub fn apply_update_in(&self, txn: &mut Transaction<'_>, update: &[u8]) -> Result<()> {
        self.expect_same_doc(txn)?;
        txn.writable()?;
        if self.shared.validator.is_some() {
            self.run_twin_validation(update, Some(txn))?;
        }
        engine::apply_update(txn.writable()?, update)?;
        Ok(())
    }

    /// Apply an update without consulting the validation hook. Used on the
    /// twin itself.
    fn apply_update_unchecked(&self, update: &[u8]) -> Result<()> {
        let mut txn = self.transaction(None)?;
        engine::apply_update(txn.writable()?, update)?;
        txn.commit();
        Ok(())
    }

    fn run_twin_validation(
        &self,
        update: &[u8],
        primary_txn: Option<&Transaction<'_>>,
    ) -> Result<()> {
        let Some(validator) = &self.shared.validator else {
            return Ok(());
        };
        let mut twin_slot = self.shared.twin.lock().unwrap();
        let twin = twin_slot.get_or_insert_with(Document::new);
        twin.apply_update_unchecked(update)?;
        if let Err(reason) = validator.validate(twin) {
            // Rebuild the twin from the primary's current state; the primary
            // never sees the rejected update.
            let snapshot = match primary_txn {
                Some(txn) => self.snapshot_in(txn),
                None => self.snapshot(),
            };
            match snapshot.and_then(|snapshot| Document::restore(&snapshot)) {
                Ok(rebuilt) => *twin_slot = Some(rebuilt),
                Err(err) => {
                    warn!(error = %err, "failed to rebuild twin after validation failure");
                    *twin_slot = Some(Document::new());
                }
            }
            return Err(DocumentError::Validation { reason }.into());
        }
        Ok(())
    }

    /// Register a callback fired once per committed transaction.
    ///
    /// The callback runs synchronously on the committing thread and must not
    /// open transactions on this document.
    pub fn observe(
        &self,
        callback: impl Fn(CommitEvent) + Send + Sync + 'static,
    ) -> Result<ObserverId> {
        let subscription = self.shared.engine.observe_commits(callback)?;
        Ok(self.register_observer(subscription))
    }

    /// Register a callback fired on subdocument changes.
    pub fn observe_subdocs(
        &self,
        callback: impl Fn(SubdocsEvent) + Send + Sync + 'static,
    ) -> Result<ObserverId> {
        let subscription = self.shared.engine.observe_subdocs(callback)?;
        Ok(self.register_observer(subscription))
    }

    fn register_observer(&self, subscription: EngineSubscription) -> ObserverId {
        let mut observers = self.shared.observers.lock().unwrap();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.push((id, subscription));
        ObserverId(id)
    }

    /// Cancel an observer callback. Returns whether it was still registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.lock().unwrap();
        let before = observers.entries.len();
        observers.entries.retain(|(entry_id, _)| *entry_id != id.0);
        observers.entries.len() != before
    }

    /// Open an asynchronous stream of commit events.
    ///
    /// `capacity` bounds the stream's buffer (`None` = unbounded). A stream
    /// that stops consuming (dropped, or bounded and full) is evicted
    /// without affecting other streams; the underlying native callback is
    /// registered on the first stream and released after the last one goes.
    pub fn commit_events(&self, capacity: Option<usize>) -> Result<EventStream<CommitEvent>> {
        let stream = self.shared.commit_streams.subscribe(capacity, || {
            let streams = Arc::clone(&self.shared.commit_streams);
            self.shared
                .engine
                .observe_commits(move |event| streams.publish(event))
        })?;
        Ok(stream)
    }

    /// Open an asynchronous stream of subdocument events. Same buffering and
    /// cleanup rules as [`Document::commit_events`].
    pub fn subdoc_events(&self, capacity: Option<usize>) -> Result<EventStream<SubdocsEvent>> {
        let stream = self.shared.subdoc_streams.subscribe(capacity, || {
            let streams = Arc::clone(&self.shared.subdoc_streams);
            self.shared
                .engine
                .observe_subdocs(move |event| streams.publish(event))
        })?;
        Ok(stream)
    }

    /// Reduce the document to its full update plus root names and kinds.
    pub fn snapshot(&self) -> Result<DocumentSnapshot> {
        let txn = self.read_transaction()?;
        self.snapshot_in(&txn)
    }

    /// [`Document::snapshot`] inside an already-held transaction.
    pub fn snapshot_in(&self, txn: &Transaction<'_>) -> Result<DocumentSnapshot> {
        self.expect_same_doc(txn)?;
        let update = txn.update_since(None)?;
        let mut roots = Vec::new();
        for (name, out) in txn.roots_out() {
            match out_kind(&out) {
                Some(kind) => roots.push((name, kind)),
                None => warn!(root = %name, "skipping non-shared root in snapshot"),
            }
        }
        Ok(DocumentSnapshot::new(update, roots))
    }

    pub(crate) fn install_root(&self, name: &str, kind: RootKind) -> Result<()> {
        let mut txn = self.transaction(None)?;
        self.install_root_in(&mut txn, name, kind)?;
        txn.commit();
        Ok(())
    }

    fn install_root_in(&self, txn: &mut Transaction<'_>, name: &str, kind: RootKind) -> Result<()> {
        match kind {
            RootKind::Map => {
                self.get_or_insert_in::<Map>(txn, name)?;
            }
            RootKind::Array => {
                self.get_or_insert_in::<Array>(txn, name)?;
            }
            RootKind::Text => {
                self.get_or_insert_in::<Text>(txn, name)?;
            }
        }
        Ok(())
    }

    fn install_roots(&self, roots: &[(String, RootKind)]) -> Result<()> {
        if roots.is_empty() {
            return Ok(());
        }
        let mut txn = self.transaction(None)?;
        for (name, kind) in roots {
            self.install_root_in(&mut txn, name, *kind)?;
        }
        txn.commit();
        Ok(())
    }
}

fn out_kind(out: &Out) -> Option<RootKind> {
    match out {
        Out::YMap(_) => Some(RootKind::Map),
        Out::YArray(_) => Some(RootKind::Array),
        Out::YText(_) => Some(RootKind::Text),
        _ => None,
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("guid", &self.shared.guid)
            .field("client_id", &self.client_id())
            .finish()
    }
}

/// Builder for documents with explicit options.
///
/// ```
/// use chorus::{Document, RootKind};
///
/// let doc = Document::builder()
///     .client_id(7)
///     .allow_multithreading(true)
///     .root("notes", RootKind::Text)
///     .build()
///     .unwrap();
/// assert_eq!(doc.client_id(), 7);
/// ```
#[derive(Default)]
pub struct DocumentBuilder {
    client_id: Option<u64>,
    multithreading: bool,
    roots: Vec<(String, RootKind)>,
    validator: Option<Arc<dyn UpdateValidator>>,
}

impl DocumentBuilder {
    /// Fix the client id instead of letting the engine pick one.
    pub fn client_id(mut self, client_id: u64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Allow the document to be used from multiple threads. Contended write
    /// acquisitions then block fairly instead of failing fast.
    pub fn allow_multithreading(mut self, allow: bool) -> Self {
        self.multithreading = allow;
        self
    }

    /// Declare a typed root to be installed at build time.
    pub fn root(mut self, name: impl Into<String>, kind: RootKind) -> Self {
        self.roots.push((name.into(), kind));
        self
    }

    /// Configure the update validation hook; this also provisions the twin
    /// document the hook runs against.
    pub fn validator(mut self, validator: Arc<dyn UpdateValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Build the document, installing declared roots.
    pub fn build(self) -> Result<Document> {
        let doc = Document::construct(self.client_id, self.multithreading, self.validator.clone());
        doc.install_roots(&self.roots)?;
        if self.validator.is_some() {
            let twin = Document::construct(None, false, None);
            twin.install_roots(&self.roots)?;
            *doc.shared.twin.lock().unwrap() = Some(twin);
        }
        Ok(doc)
    }
}
