//! Face embedding extraction.
//!
//! Detection and embedding are treated as an opaque capability behind the
//! [`FaceExtractor`] trait; the trainer only depends on the tagged
//! [`ExtractionOutcome`] so the delete/append/skip policy stays auditable
//! without the real detection backend.

mod grid;
mod mock;

pub use grid::GridEmbedder;
pub use mock::{MockBehavior, MockExtractor};

use image::RgbImage;

use crate::embedding::Embedding;
use crate::error::Result;

/// Trait for face detection + embedding backends.
///
/// Given a decoded RGB image, an implementation returns zero or more
/// candidate embeddings, one per detected face, in detection order.
/// Implementations must be thread-safe (`Send + Sync`).
pub trait FaceExtractor: Send + Sync {
    /// Detect faces and compute one embedding per detection.
    ///
    /// An empty vector means no face was found; an `Err` means the
    /// extraction itself failed.
    fn extract(&self, image: &RgbImage) -> Result<Vec<Embedding>>;

    /// Short identifier for logging.
    fn name(&self) -> &'static str;
}

/// Per-image result the trainer branches on.
///
/// The three tags map one-to-one onto the trainer policy: append, delete
/// the source file, or skip with the file retained.
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// A face was found; its embedding should be appended.
    Embedded(Embedding),
    /// No face detected; the source image is unusable for training.
    NoFaceFound,
    /// Extraction (or decoding) errored; the image is skipped, not deleted.
    Failed(String),
}

/// Run an extractor on one image and fold the result into an outcome.
///
/// When an image contains several faces, only the first detection is used
/// and the rest are ignored. That matches the historical single-subject
/// assumption; whether multi-face images should instead be rejected is an
/// open question with stakeholders.
pub fn extract_outcome(extractor: &dyn FaceExtractor, image: &RgbImage) -> ExtractionOutcome {
    match extractor.extract(image) {
        Ok(mut embeddings) => {
            if embeddings.is_empty() {
                ExtractionOutcome::NoFaceFound
            } else {
                ExtractionOutcome::Embedded(embeddings.swap_remove(0))
            }
        }
        Err(e) => ExtractionOutcome::Failed(e.to_string()),
    }
}
