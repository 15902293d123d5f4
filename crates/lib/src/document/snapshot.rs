//! Snapshot serialization of documents.
//!
//! A snapshot reduces a document to its full update bytes plus the names and
//! declared kinds of its roots: enough to reconstruct an equivalent document
//! elsewhere.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Result, document::Document, shared::RootKind};

/// Serializable reduction of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(with = "serde_bytes")]
    update: Vec<u8>,
    roots: Vec<(String, RootKind)>,
}

impl DocumentSnapshot {
    pub(crate) fn new(update: Vec<u8>, roots: Vec<(String, RootKind)>) -> Self {
        DocumentSnapshot { update, roots }
    }

    /// The full document update.
    pub fn update(&self) -> &[u8] {
        &self.update
    }

    /// Root names with their kinds.
    pub fn roots(&self) -> &[(String, RootKind)] {
        &self.roots
    }
}

impl Document {
    /// Reconstruct a document from a snapshot taken with
    /// [`Document::snapshot`].
    ///
    /// The update is applied first, then the declared roots are installed;
    /// a root that fails to install is skipped with a warning rather than
    /// failing the whole reconstruction.
    pub fn restore(snapshot: &DocumentSnapshot) -> Result<Document> {
        let doc = Document::new();
        if !snapshot.update().is_empty() {
            doc.apply_update(snapshot.update())?;
        }
        for (name, kind) in snapshot.roots() {
            if let Err(err) = doc.install_root(name, *kind) {
                warn!(root = %name, error = %err, "skipping root that failed to restore");
            }
        }
        Ok(doc)
    }
}
