//! Scripted extractor for tests.

use image::RgbImage;

use super::FaceExtractor;
use crate::embedding::Embedding;
use crate::error::{Result, VisageError};

/// What the mock should do on every call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return these embeddings as the detected faces.
    Faces(Vec<Embedding>),
    /// Detect nothing.
    NoFaces,
    /// Fail with this reason.
    Fail(String),
}

/// Extractor that replays a fixed behavior, for exercising the trainer's
/// append/delete/skip policy without a detection backend.
#[derive(Debug, Clone)]
pub struct MockExtractor {
    behavior: MockBehavior,
}

impl MockExtractor {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }

    /// Mock that always finds these faces.
    pub fn faces(embeddings: Vec<Embedding>) -> Self {
        Self::new(MockBehavior::Faces(embeddings))
    }

    /// Mock that never finds a face.
    pub fn no_faces() -> Self {
        Self::new(MockBehavior::NoFaces)
    }

    /// Mock that always errors.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::new(MockBehavior::Fail(reason.into()))
    }
}

impl FaceExtractor for MockExtractor {
    fn extract(&self, _image: &RgbImage) -> Result<Vec<Embedding>> {
        match &self.behavior {
            MockBehavior::Faces(embeddings) => Ok(embeddings.clone()),
            MockBehavior::NoFaces => Ok(Vec::new()),
            MockBehavior::Fail(reason) => Err(VisageError::ExtractionError(reason.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;

    #[test]
    fn test_mock_replays_faces() {
        let embedding = Embedding::new(vec![0.25; EMBEDDING_DIM]).unwrap();
        let mock = MockExtractor::faces(vec![embedding.clone()]);
        let result = mock.extract(&RgbImage::new(4, 4)).unwrap();
        assert_eq!(result, vec![embedding]);
    }

    #[test]
    fn test_mock_no_faces() {
        let mock = MockExtractor::no_faces();
        assert!(mock.extract(&RgbImage::new(4, 4)).unwrap().is_empty());
    }

    #[test]
    fn test_mock_failure() {
        let mock = MockExtractor::failing("scripted");
        assert!(mock.extract(&RgbImage::new(4, 4)).is_err());
    }
}
