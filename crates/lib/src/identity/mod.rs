//! Process-wide identity cache for node wrappers.
//!
//! The engine's root and child tables hand back fresh node handles on every
//! traversal. Without this cache, two lookups of the same logical node would
//! produce two distinct wrapper objects, breaking reference-equality
//! expectations and caller-side bookkeeping keyed by wrapper identity. The
//! cache maps `(document GUID, node branch id)` to a non-owning reference to
//! the one live wrapper for that node; entries whose wrapper has been
//! dropped are treated as absent.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, Weak},
};

use tracing::trace;

use crate::{
    engine::{DocGuid, NodeId},
    shared::node::NodeState,
};

type CacheKey = (DocGuid, NodeId);
type Entry = Weak<Mutex<NodeState>>;

pub(crate) struct IdentityCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<CacheKey, Entry>,
    /// Dead entries are swept once the map grows past this mark.
    high_water: usize,
}

/// The process-wide cache instance.
pub(crate) fn identity_cache() -> &'static IdentityCache {
    static CACHE: OnceLock<IdentityCache> = OnceLock::new();
    CACHE.get_or_init(|| IdentityCache {
        inner: Mutex::new(CacheInner {
            entries: HashMap::new(),
            high_water: 64,
        }),
    })
}

impl IdentityCache {
    /// Return the live wrapper for `(guid, node_id)`, or build one with
    /// `factory` and remember it.
    ///
    /// The factory runs under the cache lock, so two racing lookups of the
    /// same key can never both construct a wrapper: the loser observes the
    /// winner's entry.
    pub(crate) fn lookup_or_create(
        &self,
        guid: DocGuid,
        node_id: NodeId,
        factory: impl FnOnce() -> Arc<Mutex<NodeState>>,
    ) -> Arc<Mutex<NodeState>> {
        let mut inner = self.inner.lock().unwrap();
        let key = (guid, node_id);
        if let Some(entry) = inner.entries.get(&key)
            && let Some(handle) = entry.upgrade()
        {
            return handle;
        }
        let handle = factory();
        inner.entries.insert(key, Arc::downgrade(&handle));
        inner.sweep_if_crowded();
        handle
    }

    /// Remember an already-constructed wrapper, e.g. one that was just
    /// integrated from its preliminary state.
    pub(crate) fn register(&self, guid: DocGuid, node_id: NodeId, handle: &Arc<Mutex<NodeState>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert((guid, node_id), Arc::downgrade(handle));
        inner.sweep_if_crowded();
    }

    /// Drop every entry belonging to a document, called on document
    /// teardown.
    pub(crate) fn purge_document(&self, guid: &DocGuid) {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|(entry_guid, _), _| entry_guid != guid);
        trace!(
            guid = %guid,
            purged = before - inner.entries.len(),
            "purged identity cache entries"
        );
    }
}

impl CacheInner {
    fn sweep_if_crowded(&mut self) {
        if self.entries.len() < self.high_water {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.strong_count() > 0);
        self.high_water = (self.entries.len() * 2).max(64);
        trace!(
            swept = before - self.entries.len(),
            remaining = self.entries.len(),
            "swept dead identity cache entries"
        );
    }
}
