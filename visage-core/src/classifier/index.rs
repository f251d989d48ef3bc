//! Pluggable nearest-neighbor index strategies.
//!
//! The classifier does not mandate a spatial indexing algorithm; strategies
//! are registered by name and created through [`IndexStrategyFactory`].
//! Both shipped strategies return exact results, so they are
//! interchangeable apart from query cost.

use crate::embedding::Embedding;
use crate::error::{Result, VisageError};

/// Exhaustive scan strategy name.
pub const STRATEGY_LINEAR: &str = "linear";
/// Axis-split tree strategy name.
pub const STRATEGY_KDTREE: &str = "kdtree";
/// Strategy used when none is configured.
pub const DEFAULT_STRATEGY: &str = STRATEGY_KDTREE;

/// A built nearest-neighbor index over a fixed embedding set.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait NeighborIndex: std::fmt::Debug + Send + Sync {
    /// Return up to `k` nearest stored embeddings as `(stored index,
    /// distance)` pairs, sorted by ascending distance.
    fn search(&self, query: &Embedding, k: usize) -> Vec<(usize, f32)>;

    /// The strategy name this index was built with.
    fn strategy(&self) -> &'static str;
}

/// Factory creating index strategies by registered name.
pub struct IndexStrategyFactory;

impl IndexStrategyFactory {
    /// Build an index over `embeddings` using the named strategy.
    pub fn create(name: &str, embeddings: Vec<Embedding>) -> Result<Box<dyn NeighborIndex>> {
        match name {
            STRATEGY_LINEAR => Ok(Box::new(LinearIndex::new(embeddings))),
            STRATEGY_KDTREE => Ok(Box::new(KdTreeIndex::new(embeddings))),
            other => Err(VisageError::UnknownStrategy(other.to_string())),
        }
    }

    /// Names accepted by [`IndexStrategyFactory::create`].
    pub fn known_strategies() -> &'static [&'static str] {
        &[STRATEGY_LINEAR, STRATEGY_KDTREE]
    }
}

/// Brute-force exact index: distance to every stored embedding per query.
#[derive(Debug)]
pub struct LinearIndex {
    embeddings: Vec<Embedding>,
}

impl LinearIndex {
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        Self { embeddings }
    }
}

impl NeighborIndex for LinearIndex {
    fn search(&self, query: &Embedding, k: usize) -> Vec<(usize, f32)> {
        let mut distances: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, query.distance(e)))
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        distances.truncate(k);
        distances
    }

    fn strategy(&self) -> &'static str {
        STRATEGY_LINEAR
    }
}

/// k-d tree over the embedding space, split axis cycling by depth.
#[derive(Debug)]
pub struct KdTreeIndex {
    embeddings: Vec<Embedding>,
    root: Option<Box<KdNode>>,
}

#[derive(Debug)]
struct KdNode {
    /// Index into `embeddings`.
    point: usize,
    /// Split dimension at this node.
    dim: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

impl KdTreeIndex {
    pub fn new(embeddings: Vec<Embedding>) -> Self {
        let mut indices: Vec<usize> = (0..embeddings.len()).collect();
        let root = Self::build(&embeddings, &mut indices, 0);
        Self { embeddings, root }
    }

    fn build(embeddings: &[Embedding], indices: &mut [usize], depth: usize) -> Option<Box<KdNode>> {
        if indices.is_empty() {
            return None;
        }
        let dim = depth % crate::embedding::EMBEDDING_DIM;
        indices.sort_by(|&a, &b| {
            embeddings[a].values()[dim].total_cmp(&embeddings[b].values()[dim])
        });
        let median = indices.len() / 2;
        let point = indices[median];
        let (left, rest) = indices.split_at_mut(median);
        let right = &mut rest[1..];

        Some(Box::new(KdNode {
            point,
            dim,
            left: Self::build(embeddings, left, depth + 1),
            right: Self::build(embeddings, right, depth + 1),
        }))
    }

    fn search_node(
        &self,
        node: &KdNode,
        query: &Embedding,
        k: usize,
        best: &mut Vec<(usize, f32)>,
    ) {
        let distance = query.distance(&self.embeddings[node.point]);
        insert_candidate(best, k, (node.point, distance));

        let diff = query.values()[node.dim] - self.embeddings[node.point].values()[node.dim];
        let (near, far) = if diff < 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(child) = near {
            self.search_node(child, query, k, best);
        }

        // The far side can only help when the splitting plane is closer
        // than the current worst candidate, or the candidate set is short.
        let worst = best.last().map(|&(_, d)| d).unwrap_or(f32::INFINITY);
        if best.len() < k || diff.abs() <= worst {
            if let Some(child) = far {
                self.search_node(child, query, k, best);
            }
        }
    }
}

/// Insert into a distance-sorted candidate list capped at `k` entries.
fn insert_candidate(best: &mut Vec<(usize, f32)>, k: usize, candidate: (usize, f32)) {
    let pos = best
        .binary_search_by(|&(_, d)| d.total_cmp(&candidate.1))
        .unwrap_or_else(|p| p);
    best.insert(pos, candidate);
    best.truncate(k);
}

impl NeighborIndex for KdTreeIndex {
    fn search(&self, query: &Embedding, k: usize) -> Vec<(usize, f32)> {
        let mut best = Vec::with_capacity(k + 1);
        if k == 0 {
            return best;
        }
        if let Some(root) = &self.root {
            self.search_node(root, query, k, &mut best);
        }
        best
    }

    fn strategy(&self) -> &'static str {
        STRATEGY_KDTREE
    }
}
