//! Collaborative string-keyed map.

use std::fmt;

use crate::{
    Result,
    shared::{
        SharedType, Value,
        errors::SharedTypeError,
        node::{self, EngineNode, NodeHandle, Prelim},
    },
    transaction::Transaction,
};

/// A collaborative map node.
///
/// Constructed detached, with optional preliminary entries, then integrated
/// by assigning it to a document root or inserting it into an integrated
/// container. Cloning is shallow: clones refer to the same node and compare
/// equal under [`Map::ptr_eq`].
#[derive(Clone)]
pub struct Map {
    handle: NodeHandle,
}

impl Map {
    /// Create a new detached map.
    pub fn new() -> Self {
        Map {
            handle: NodeHandle::detached(Prelim::Map(Vec::new())),
        }
    }

    pub(crate) fn from_node(handle: NodeHandle) -> Self {
        Map { handle }
    }

    pub(crate) fn node_handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Whether `self` and `other` are the same node wrapper.
    pub fn ptr_eq(&self, other: &Map) -> bool {
        self.handle.ptr_eq(&other.handle)
    }

    /// Whether this map has been integrated into a document.
    pub fn is_integrated(&self) -> bool {
        self.handle.is_integrated()
    }

    /// Preliminary content as plain data; `None` once integrated.
    pub fn preliminary(&self) -> Option<Value> {
        self.handle.plain_preview()
    }

    fn resolve(
        &self,
        txn: &Transaction<'_>,
    ) -> Result<(crate::document::Document, crate::engine::MapRef)> {
        let (doc, node) = node::integrated_as_map(&self.handle)?;
        doc.expect_same_doc(txn)?;
        Ok((doc, node))
    }

    /// Set `key` to `value`, integrating detached shared values.
    pub fn insert(
        &self,
        txn: &mut Transaction<'_>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let (doc, node) = self.resolve(txn)?;
        let write = txn.writable()?;
        node::insert_into_map(&doc, write, &node, &key.into(), value.into())?;
        Ok(())
    }

    /// Get the value at `key`, failing when absent.
    pub fn get(&self, txn: &Transaction<'_>, key: &str) -> Result<Value> {
        self.try_get(txn, key)?.ok_or_else(|| {
            SharedTypeError::KeyNotFound {
                key: key.to_owned(),
            }
            .into()
        })
    }

    /// Get the value at `key`, or `None` when absent.
    pub fn try_get(&self, txn: &Transaction<'_>, key: &str) -> Result<Option<Value>> {
        let (doc, node) = self.resolve(txn)?;
        Ok(node::map_get_out(txn, &node, key).map(|out| node::out_to_value(&doc, out)))
    }

    /// Remove `key`, returning its former value as plain data (or a
    /// subdocument handle). Fails when the key is absent.
    pub fn remove(&self, txn: &mut Transaction<'_>, key: &str) -> Result<Value> {
        let (_, node) = self.resolve(txn)?;
        txn.writable()?;
        // Deep-read before removal; node contents are unreadable afterwards.
        let removed = match node::map_get_out(txn, &node, key) {
            Some(out) => node::removed_to_value(txn, out),
            None => {
                return Err(SharedTypeError::KeyNotFound {
                    key: key.to_owned(),
                }
                .into());
            }
        };
        use crate::engine::MapOps;
        node.remove(txn.writable()?, key);
        Ok(removed)
    }

    pub fn contains_key(&self, txn: &Transaction<'_>, key: &str) -> Result<bool> {
        let (_, node) = self.resolve(txn)?;
        Ok(node::map_get_out(txn, &node, key).is_some())
    }

    pub fn len(&self, txn: &Transaction<'_>) -> Result<u32> {
        let (_, node) = self.resolve(txn)?;
        Ok(node::map_len(txn, &node))
    }

    pub fn is_empty(&self, txn: &Transaction<'_>) -> Result<bool> {
        Ok(self.len(txn)? == 0)
    }

    pub fn keys(&self, txn: &Transaction<'_>) -> Result<Vec<String>> {
        let (_, node) = self.resolve(txn)?;
        Ok(node::map_keys(txn, &node))
    }

    /// Key-value pairs, with shared values resolved through the identity
    /// cache. Iteration order is unspecified.
    pub fn items(&self, txn: &Transaction<'_>) -> Result<Vec<(String, Value)>> {
        let (doc, node) = self.resolve(txn)?;
        let mut items = Vec::new();
        for key in node::map_keys(txn, &node) {
            if let Some(out) = node::map_get_out(txn, &node, &key) {
                let value = node::out_to_value(&doc, out);
                items.push((key, value));
            }
        }
        Ok(items)
    }

    pub fn values(&self, txn: &Transaction<'_>) -> Result<Vec<Value>> {
        Ok(self.items(txn)?.into_iter().map(|(_, value)| value).collect())
    }

    /// Remove every entry.
    pub fn clear(&self, txn: &mut Transaction<'_>) -> Result<()> {
        let (_, node) = self.resolve(txn)?;
        txn.writable()?;
        use crate::engine::MapOps;
        for key in node::map_keys(txn, &node) {
            node.remove(txn.writable()?, &key);
        }
        Ok(())
    }

    /// Deep-convert to plain data. On a detached map this is the preliminary
    /// content.
    pub fn to_value(&self, txn: &Transaction<'_>) -> Result<Value> {
        if let Some(prelim) = self.handle.plain_preview() {
            return Ok(prelim);
        }
        let (_, node) = self.resolve(txn)?;
        Ok(node::node_to_plain(txn, &EngineNode::Map(node)))
    }
}

impl SharedType for Map {
    fn kind() -> crate::shared::RootKind {
        crate::shared::RootKind::Map
    }

    fn from_handle(handle: NodeHandle) -> Self {
        Map::from_node(handle)
    }

    fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Map {
            handle: NodeHandle::detached(Prelim::Map(entries)),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Map {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for Map {
    fn from(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().collect()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("integrated", &self.is_integrated())
            .finish()
    }
}
