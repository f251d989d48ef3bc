//! Persisted encoding store.
//!
//! The store is the single source of truth for what the classifier has
//! learned so far: two index-aligned sequences, embeddings and labels,
//! serialized to a CBOR file. It is append-only within a run and never
//! shrinks across runs.
//!
//! Embeddings are never retroactively pruned when their source image later
//! disappears from disk; the store and the filesystem are independent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedding::Embedding;
use crate::error::{Result, VisageError};

/// In-memory snapshot of the encoding store.
///
/// Invariant: `embeddings.len() == labels.len()` after every operation;
/// `labels[i]` is the identity for `embeddings[i]`. Entries keep insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    embeddings: Vec<Embedding>,
    labels: Vec<String>,
}

impl StoreSnapshot {
    /// Load a snapshot from disk.
    ///
    /// A missing file is the expected state of the very first run and yields
    /// an empty snapshot, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No encoding store on disk, starting empty");
            return Ok(Self::default());
        }

        let bytes = fs::read(path)?;
        let snapshot: Self = ciborium::from_reader(bytes.as_slice())
            .map_err(|e| VisageError::SerializationError(e.to_string()))?;

        info!(
            path = %path.display(),
            entries = snapshot.len(),
            "Loaded existing encodings"
        );
        Ok(snapshot)
    }

    /// Append one (embedding, label) pair. Existing entries are never
    /// removed or mutated.
    pub fn append(&mut self, embedding: Embedding, label: String) {
        self.embeddings.push(embedding);
        self.labels.push(label);
    }

    /// Atomically persist the full snapshot, overwriting any prior file.
    ///
    /// Writes to a temporary sibling first and renames into place, so a
    /// crash mid-write never leaves a truncated store. Safe to call with no
    /// new entries; the current truth is rewritten as-is.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| VisageError::SerializationError(e.to_string()))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, path)?;

        info!(
            path = %path.display(),
            entries = self.len(),
            bytes = bytes.len(),
            "Saved encoding store"
        );
        Ok(())
    }

    /// Number of stored (embedding, label) pairs.
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.embeddings.len(), self.labels.len());
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Iterate aligned (embedding, label) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Embedding, &str)> {
        self.embeddings
            .iter()
            .zip(self.labels.iter().map(String::as_str))
    }
}
