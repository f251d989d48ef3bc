use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisageError {
    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No encodings available, training aborted")]
    EmptySnapshot,

    #[error("Invalid neighbor count {requested} for {available} stored encodings")]
    InvalidNeighborCount { requested: usize, available: usize },

    #[error("Unknown index strategy: {0}")]
    UnknownStrategy(String),

    #[error("Training root is not a directory: {}", .0.display())]
    InvalidTrainRoot(PathBuf),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VisageError>;
