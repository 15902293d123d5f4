//! Collaborative sequence.

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

/// A collaborative sequence node.
///
/// Constructed detached, with optional preliminary items, then integrated by
/// assigning it to a document root or inserting it into an integrated
/// container. Cloning is shallow.
#[derive(Clone)]
pub struct Array {
    handle: NodeHandle,
}

impl Array {
    /// Create a new detached sequence.
    pub fn new() -> Self {
        Array {
            handle: NodeHandle::detached(Prelim::Array(Vec::new())),
        }
    }

    pub(crate) fn from_node(handle: NodeHandle) -> Self {
        Array { handle }
    }

    pub(crate) fn node_handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Whether `self` and `other` are the same node wrapper.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        self.handle.ptr_eq(&other.handle)
    }

    /// Whether this sequence has been integrated into a document.
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
    ) -> Result<(crate::document::Document, crate::engine::ArrayRef)> {
        let (doc, node) = node::integrated_as_array(&self.handle)?;
        doc.expect_same_doc(txn)?;
        Ok((doc, node))
    }

    /// Append `value`, integrating detached shared values.
    pub fn push(&self, txn: &mut Transaction<'_>, value: impl Into<Value>) -> Result<()> {
        let (doc, node) = self.resolve(txn)?;
        let index = node::array_len(txn, &node);
        let write = txn.writable()?;
        node::insert_into_array(&doc, write, &node, index, value.into())?;
        Ok(())
    }

    /// Insert `value` at `index`, shifting later items.
    pub fn insert(
        &self,
        txn: &mut Transaction<'_>,
        index: u32,
        value: impl Into<Value>,
    ) -> Result<()> {
        let (doc, node) = self.resolve(txn)?;
        let len = node::array_len(txn, &node);
        if index > len {
            return Err(SharedTypeError::IndexOutOfBounds { index, len }.into());
        }
        let write = txn.writable()?;
        node::insert_into_array(&doc, write, &node, index, value.into())?;
        Ok(())
    }

    /// Get the value at `index`.
    pub fn get(&self, txn: &Transaction<'_>, index: u32) -> Result<Value> {
        let (doc, node) = self.resolve(txn)?;
        match node::array_get_out(txn, &node, index) {
            Some(out) => Ok(node::out_to_value(&doc, out)),
            None => Err(SharedTypeError::IndexOutOfBounds {
                index,
                len: node::array_len(txn, &node),
            }
            .into()),
        }
    }

    /// Remove the item at `index`, returning its former value as plain data
    /// (or a subdocument handle).
    pub fn remove(&self, txn: &mut Transaction<'_>, index: u32) -> Result<Value> {
        let (_, node) = self.resolve(txn)?;
        txn.writable()?;
        // Deep-read before removal; node contents are unreadable afterwards.
        let removed = match node::array_get_out(txn, &node, index) {
            Some(out) => node::removed_to_value(txn, out),
            None => {
                return Err(SharedTypeError::IndexOutOfBounds {
                    index,
                    len: node::array_len(txn, &node),
                }
                .into());
            }
        };
        use crate::engine::ArrayOps;
        node.remove_range(txn.writable()?, index, 1);
        Ok(removed)
    }

    pub fn len(&self, txn: &Transaction<'_>) -> Result<u32> {
        let (_, node) = self.resolve(txn)?;
        Ok(node::array_len(txn, &node))
    }

    pub fn is_empty(&self, txn: &Transaction<'_>) -> Result<bool> {
        Ok(self.len(txn)? == 0)
    }

    /// All items, with shared values resolved through the identity cache.
    pub fn to_vec(&self, txn: &Transaction<'_>) -> Result<Vec<Value>> {
        let (doc, node) = self.resolve(txn)?;
        let len = node::array_len(txn, &node);
        let mut items = Vec::with_capacity(len as usize);
        for index in 0..len {
            if let Some(out) = node::array_get_out(txn, &node, index) {
                items.push(node::out_to_value(&doc, out));
            }
        }
        Ok(items)
    }

    /// Deep-convert to plain data. On a detached sequence this is the
    /// preliminary content.
    pub fn to_value(&self, txn: &Transaction<'_>) -> Result<Value> {
        if let Some(prelim) = self.handle.plain_preview() {
            return Ok(prelim);
        }
        let (_, node) = self.resolve(txn)?;
        Ok(node::node_to_plain(txn, &EngineNode::Array(node)))
    }
}

impl SharedType for Array {
    fn kind() -> crate::shared::RootKind {
        crate::shared::RootKind::Array
    }

    fn from_handle(handle: NodeHandle) -> Self {
        Array::from_node(handle)
    }

    fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Array {
            handle: NodeHandle::detached(Prelim::Array(
                iter.into_iter().map(Into::into).collect(),
            )),
        }
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Array {
    fn from(items: [V; N]) -> Self {
        items.into_iter().collect()
    }
}

impl<V: Into<Value>> From<Vec<V>> for Array {
    fn from(items: Vec<V>) -> Self {
        items.into_iter().collect()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("integrated", &self.is_integrated())
            .finish()
    }
}
