//! Distance-weighted nearest-neighbor classifier.
//!
//! The classifier is rebuilt from the full encoding store every run; only
//! the training data is incremental, never the model structure. Neighbor
//! votes are weighted by inverse distance so closer stored examples
//! dominate, and the neighbor count defaults to `round(sqrt(N))` when not
//! configured explicitly.

mod index;

pub use index::{
    IndexStrategyFactory, KdTreeIndex, LinearIndex, NeighborIndex, DEFAULT_STRATEGY,
    STRATEGY_KDTREE, STRATEGY_LINEAR,
};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::embedding::Embedding;
use crate::error::{Result, VisageError};
use crate::store::StoreSnapshot;

/// Distances below this count as an exact match for voting purposes.
const EXACT_MATCH_EPS: f32 = 1e-9;

/// One neighbor considered during a prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub label: String,
    pub distance: f32,
}

/// Result of classifying a query embedding.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Most likely identity by weighted vote.
    pub label: String,
    /// The `k` neighbors consulted, nearest first. Exposed so callers can
    /// apply their own confidence thresholds.
    pub neighbors: Vec<Neighbor>,
}

/// Serialized form of the classifier artifact; the index is rebuilt on
/// load rather than persisted.
#[derive(Serialize, Deserialize)]
struct ClassifierData {
    k: usize,
    strategy: String,
    embeddings: Vec<Embedding>,
    labels: Vec<String>,
}

/// A fitted distance-weighted KNN classifier.
pub struct KnnClassifier {
    k: usize,
    strategy: String,
    labels: Vec<String>,
    embeddings: Vec<Embedding>,
    index: Box<dyn NeighborIndex>,
}

impl std::fmt::Debug for KnnClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnnClassifier")
            .field("k", &self.k)
            .field("strategy", &self.strategy)
            .field("labels", &self.labels)
            .field("embeddings", &self.embeddings)
            .finish_non_exhaustive()
    }
}

impl KnnClassifier {
    /// Fit a classifier over the full snapshot.
    ///
    /// `n_neighbors` unset auto-derives `k = round(sqrt(N))`; set, it must
    /// be within `1..=N`. An empty snapshot is a hard error: a degenerate
    /// classifier must never be produced silently.
    #[instrument(level = "info", skip(snapshot), fields(entries = snapshot.len()))]
    pub fn fit(
        snapshot: &StoreSnapshot,
        n_neighbors: Option<usize>,
        strategy: &str,
    ) -> Result<Self> {
        let n = snapshot.len();
        if n == 0 {
            return Err(VisageError::EmptySnapshot);
        }

        let k = match n_neighbors {
            Some(k) if k == 0 || k > n => {
                return Err(VisageError::InvalidNeighborCount {
                    requested: k,
                    available: n,
                })
            }
            Some(k) => k,
            None => {
                let k = auto_neighbor_count(n);
                info!(k, n, "Auto-selected neighbor count");
                k
            }
        };

        let embeddings = snapshot.embeddings().to_vec();
        let labels = snapshot.labels().to_vec();
        let index = IndexStrategyFactory::create(strategy, embeddings.clone())?;

        info!(k, strategy, entries = n, "Fitted KNN classifier");
        Ok(Self {
            k,
            strategy: strategy.to_string(),
            labels,
            embeddings,
            index,
        })
    }

    /// Classify a query embedding by distance-weighted vote.
    ///
    /// Votes are weighted `1 / distance`. When any neighbor is an exact
    /// match, only exact matches vote (their distance weight would be
    /// unbounded anyway).
    pub fn predict(&self, query: &Embedding) -> Prediction {
        let nearest = self.index.search(query, self.k);

        let exact = nearest.iter().any(|&(_, d)| d <= EXACT_MATCH_EPS);
        // Order-preserving tally keeps ties deterministic in insertion order.
        let mut tally: Vec<(&str, f64)> = Vec::new();
        for &(idx, distance) in &nearest {
            let weight = if exact {
                if distance <= EXACT_MATCH_EPS {
                    1.0
                } else {
                    0.0
                }
            } else {
                1.0 / f64::from(distance)
            };

            let label = self.labels[idx].as_str();
            match tally.iter_mut().find(|(l, _)| *l == label) {
                Some((_, w)) => *w += weight,
                None => tally.push((label, weight)),
            }
        }

        let label = tally
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(l, _)| l.to_string())
            .unwrap_or_default();

        debug!(%label, neighbors = nearest.len(), "Classified query");
        Prediction {
            label,
            neighbors: nearest
                .into_iter()
                .map(|(idx, distance)| Neighbor {
                    label: self.labels[idx].clone(),
                    distance,
                })
                .collect(),
        }
    }

    /// The neighbor count this classifier was fitted with.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The index strategy name this classifier was fitted with.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Number of stored training examples.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Serialize the classifier artifact to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let data = ClassifierData {
            k: self.k,
            strategy: self.strategy.clone(),
            embeddings: self.embeddings.clone(),
            labels: self.labels.clone(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&data, &mut bytes)
            .map_err(|e| VisageError::SerializationError(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize a classifier artifact, rebuilding its index.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let data: ClassifierData = ciborium::from_reader(bytes)
            .map_err(|e| VisageError::SerializationError(e.to_string()))?;
        let index = IndexStrategyFactory::create(&data.strategy, data.embeddings.clone())?;
        Ok(Self {
            k: data.k,
            strategy: data.strategy,
            labels: data.labels,
            embeddings: data.embeddings,
            index,
        })
    }

    /// Write the artifact to disk, overwriting any previous one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_cbor()?;
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "Saved classifier artifact");
        Ok(())
    }

    /// Load an artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_cbor(&bytes)
    }
}

/// `round(sqrt(n))`, the bias/variance heuristic recomputed every run.
fn auto_neighbor_count(n: usize) -> usize {
    ((n as f64).sqrt().round() as usize).max(1)
}
