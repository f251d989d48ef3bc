//! Grid-statistics baseline embedder.
//!
//! Stands in for a real face-detection backend: it derives a deterministic
//! 128-dimensional embedding from luminance and chroma statistics over an
//! 8x8 grid, gated by a contrast check that rejects near-uniform frames
//! (blank walls, over/under-exposed shots) as "no face". A production
//! detector plugs in behind the same [`FaceExtractor`] trait.

use image::RgbImage;
use tracing::debug;

use super::FaceExtractor;
use crate::embedding::{normalize_l2_in_place, Embedding, EMBEDDING_DIM};
use crate::error::{Result, VisageError};

/// Grid cells per axis; 8x8 cells x 2 channels = 128 components.
const GRID: u32 = 8;

/// Minimum luminance standard deviation (0..=1 scale) for a frame to count
/// as containing a subject.
const DEFAULT_CONTRAST_GATE: f32 = 0.02;

/// Deterministic image-statistics embedder.
#[derive(Debug, Clone)]
pub struct GridEmbedder {
    contrast_gate: f32,
}

impl GridEmbedder {
    pub fn new() -> Self {
        Self {
            contrast_gate: DEFAULT_CONTRAST_GATE,
        }
    }

    /// Override the contrast gate (mainly for tests).
    pub fn with_contrast_gate(contrast_gate: f32) -> Self {
        Self { contrast_gate }
    }

    /// Mean and standard deviation of pixel luminance, on a 0..=1 scale.
    fn luminance_stats(image: &RgbImage) -> (f32, f32) {
        let n = (image.width() * image.height()) as f32;
        let mut sum = 0.0_f32;
        let mut sum_sq = 0.0_f32;
        for pixel in image.pixels() {
            let y = luminance(pixel.0);
            sum += y;
            sum_sq += y * y;
        }
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }

    /// Per-cell mean luminance and red-blue chroma over the grid.
    fn grid_features(image: &RgbImage) -> Vec<f32> {
        let mut features = Vec::with_capacity(EMBEDDING_DIM);
        let (w, h) = (image.width(), image.height());

        for cy in 0..GRID {
            for cx in 0..GRID {
                let x0 = cx * w / GRID;
                let x1 = ((cx + 1) * w / GRID).max(x0 + 1).min(w);
                let y0 = cy * h / GRID;
                let y1 = ((cy + 1) * h / GRID).max(y0 + 1).min(h);

                let mut luma = 0.0_f32;
                let mut chroma = 0.0_f32;
                let mut count = 0.0_f32;
                for y in y0..y1 {
                    for x in x0..x1 {
                        let rgb = image.get_pixel(x, y).0;
                        let [r, _, b] = rgb.map(|c| c as f32 / 255.0);
                        luma += luminance(rgb);
                        chroma += r - b;
                        count += 1.0;
                    }
                }
                features.push(luma / count);
                features.push(chroma / count);
            }
        }
        features
    }
}

impl Default for GridEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn luminance(rgb: [u8; 3]) -> f32 {
    let [r, g, b] = rgb.map(|c| c as f32 / 255.0);
    0.299 * r + 0.587 * g + 0.114 * b
}

impl FaceExtractor for GridEmbedder {
    fn extract(&self, image: &RgbImage) -> Result<Vec<Embedding>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(VisageError::ExtractionError("empty image".into()));
        }

        let (mean, stddev) = Self::luminance_stats(image);
        if stddev < self.contrast_gate {
            debug!(mean, stddev, "Contrast gate rejected frame");
            return Ok(Vec::new());
        }

        let mut features = Self::grid_features(image);
        normalize_l2_in_place(&mut features);
        Ok(vec![Embedding::new(features)?])
    }

    fn name(&self) -> &'static str {
        "grid"
    }
}
