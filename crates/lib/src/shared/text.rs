//! Collaborative text.

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

/// A collaborative text node.
///
/// Constructed detached, with optional preliminary content, then integrated
/// by assigning it to a document root or inserting it into an integrated
/// container. Cloning is shallow.
#[derive(Clone)]
pub struct Text {
    handle: NodeHandle,
}

impl Text {
    /// Create a new detached, empty text.
    pub fn new() -> Self {
        Text {
            handle: NodeHandle::detached(Prelim::Text(String::new())),
        }
    }

    pub(crate) fn from_node(handle: NodeHandle) -> Self {
        Text { handle }
    }

    pub(crate) fn node_handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Whether `self` and `other` are the same node wrapper.
    pub fn ptr_eq(&self, other: &Text) -> bool {
        self.handle.ptr_eq(&other.handle)
    }

    /// Whether this text has been integrated into a document.
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
    ) -> Result<(crate::document::Document, crate::engine::TextRef)> {
        let (doc, node) = node::integrated_as_text(&self.handle)?;
        doc.expect_same_doc(txn)?;
        Ok((doc, node))
    }

    /// Insert `chunk` at character offset `index`.
    pub fn insert(&self, txn: &mut Transaction<'_>, index: u32, chunk: &str) -> Result<()> {
        let (_, node) = self.resolve(txn)?;
        let len = node::text_len(txn, &node);
        if index > len {
            return Err(SharedTypeError::IndexOutOfBounds { index, len }.into());
        }
        use crate::engine::TextOps;
        node.insert(txn.writable()?, index, chunk);
        Ok(())
    }

    /// Append `chunk`.
    pub fn push(&self, txn: &mut Transaction<'_>, chunk: &str) -> Result<()> {
        let (_, node) = self.resolve(txn)?;
        use crate::engine::TextOps;
        node.push(txn.writable()?, chunk);
        Ok(())
    }

    /// Remove `len` characters starting at `index`.
    pub fn remove_range(&self, txn: &mut Transaction<'_>, index: u32, len: u32) -> Result<()> {
        let (_, node) = self.resolve(txn)?;
        let text_len = node::text_len(txn, &node);
        if index + len > text_len {
            return Err(SharedTypeError::IndexOutOfBounds {
                index: index + len,
                len: text_len,
            }
            .into());
        }
        use crate::engine::TextOps;
        node.remove_range(txn.writable()?, index, len);
        Ok(())
    }

    pub fn len(&self, txn: &Transaction<'_>) -> Result<u32> {
        let (_, node) = self.resolve(txn)?;
        Ok(node::text_len(txn, &node))
    }

    pub fn is_empty(&self, txn: &Transaction<'_>) -> Result<bool> {
        Ok(self.len(txn)? == 0)
    }

    /// The current text content.
    pub fn get_string(&self, txn: &Transaction<'_>) -> Result<String> {
        let (_, node) = self.resolve(txn)?;
        Ok(node::text_string(txn, &node))
    }

    /// Deep-convert to plain data. On a detached text this is the
    /// preliminary content.
    pub fn to_value(&self, txn: &Transaction<'_>) -> Result<Value> {
        if let Some(prelim) = self.handle.plain_preview() {
            return Ok(prelim);
        }
        let (_, node) = self.resolve(txn)?;
        Ok(node::node_to_plain(txn, &EngineNode::Text(node)))
    }
}

impl SharedType for Text {
    fn kind() -> crate::shared::RootKind {
        crate::shared::RootKind::Text
    }

    fn from_handle(handle: NodeHandle) -> Self {
        Text::from_node(handle)
    }

    fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Default for Text {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Text {
    fn from(content: &str) -> Self {
        Text {
            handle: NodeHandle::detached(Prelim::Text(content.to_owned())),
        }
    }
}

impl From<String> for Text {
    fn from(content: String) -> Self {
        Text {
            handle: NodeHandle::detached(Prelim::Text(content)),
        }
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Text")
            .field("integrated", &self.is_integrated())
            .finish()
    }
}
