//! Face embedding vector type and identity label handling.
//!
//! An embedding is a fixed-length feature vector describing one face. The
//! store, the classifier, and the extractor all exchange this type; the
//! dimension is fixed at construction and checked at every boundary so a
//! malformed vector can never reach the index.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisageError};

/// Fixed embedding dimension produced by every extractor.
pub const EMBEDDING_DIM: usize = 128;

/// A fixed-length face embedding vector.
///
/// Immutable once produced; ownership transfers to the encoding store when
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Create an embedding, validating the dimension.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(VisageError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// The raw vector components.
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean (L2) distance to another embedding.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }
}

/// Normalize a vector to unit L2 norm in place.
///
/// Returns `false` (leaving the input untouched) when the norm is zero or
/// non-finite.
pub fn normalize_l2_in_place(values: &mut [f32]) -> bool {
    let sum: f32 = values.iter().map(|v| v * v).sum();
    if !sum.is_finite() || sum <= 0.0 {
        return false;
    }
    let norm = sum.sqrt();
    for value in values.iter_mut() {
        *value /= norm;
    }
    true
}

/// Derive a classifier label from a user folder name of the form
/// `{userId}_{displayName}`.
///
/// The user-id prefix up to the first underscore is stripped, then every
/// character that is not ASCII alphanumeric or a space is removed. A folder
/// without an underscore sanitizes the whole name.
pub fn label_from_folder_name(folder_name: &str) -> String {
    let name_part = folder_name
        .split_once('_')
        .map(|(_, rest)| rest)
        .unwrap_or(folder_name);

    name_part
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}
