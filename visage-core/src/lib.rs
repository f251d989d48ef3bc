//! Visage Core - incremental face-embedding cache and classifier pipeline
//!
//! This crate maintains a growing nearest-neighbor face classifier from an
//! externally supplied pool of labeled face images:
//!
//! - A persisted, append-only **encoding store** of (embedding, label) pairs
//! - A pluggable **embedding extractor** seam over the face-detection backend
//! - A distance-weighted **KNN classifier** rebuilt deterministically each run
//! - The **incremental trainer** orchestrating a full run
//! - A **fetch pipeline** collaborator that populates the training folders
//!   from a remote API
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use visage_core::{train_incremental, GridEmbedder, TrainerConfig};
//!
//! # fn example() -> visage_core::Result<()> {
//! let config = TrainerConfig::new("shared/train_images".into(), Path::new("shared"));
//! let report = train_incremental(&config, &GridEmbedder::new())?;
//! println!("{} encodings, k = {}", report.total_encodings, report.neighbor_count);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod store;
pub mod trainer;

// Re-export main types for convenience
pub use classifier::{
    IndexStrategyFactory, KnnClassifier, Neighbor, NeighborIndex, Prediction, DEFAULT_STRATEGY,
    STRATEGY_KDTREE, STRATEGY_LINEAR,
};
pub use embedding::{label_from_folder_name, Embedding, EMBEDDING_DIM};
pub use error::{Result, VisageError};
pub use extract::{
    extract_outcome, ExtractionOutcome, FaceExtractor, GridEmbedder, MockExtractor,
};
pub use fetch::{
    prune_missing_images, write_metadata, FetchClient, FetchConfig, UserImageData, UserRecord,
};
pub use store::StoreSnapshot;
pub use trainer::{train_incremental, TrainReport, TrainerConfig};
