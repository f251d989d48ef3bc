//! Incremental training orchestrator.
//!
//! One run: load the persisted encoding store, walk the per-user image
//! folders, extract an embedding per image, merge new encodings into the
//! store, persist it, and rebuild the classifier artifact from the merged
//! set. Per-image failures are soft; only an empty merged snapshot aborts
//! the run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument, warn};

use crate::classifier::{KnnClassifier, DEFAULT_STRATEGY};
use crate::embedding::label_from_folder_name;
use crate::error::{Result, VisageError};
use crate::extract::{extract_outcome, ExtractionOutcome, FaceExtractor};
use crate::store::StoreSnapshot;

/// Image file extensions considered for training.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Configuration for one training run, constructed at the CLI boundary and
/// passed by value.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Directory of `{userId}_{name}` folders to walk.
    pub train_root: PathBuf,
    /// Persisted encoding store path.
    pub store_path: PathBuf,
    /// Classifier artifact output path.
    pub model_path: PathBuf,
    /// Explicit neighbor count; `None` auto-derives `round(sqrt(N))`.
    pub n_neighbors: Option<usize>,
    /// Nearest-neighbor index strategy name.
    pub index_strategy: String,
}

impl TrainerConfig {
    /// Config with derived artifact paths under `output_dir`.
    pub fn new(train_root: PathBuf, output_dir: &Path) -> Self {
        Self {
            train_root,
            store_path: output_dir.join("face_data.bin"),
            model_path: output_dir.join("trained_knn_model.bin"),
            n_neighbors: None,
            index_strategy: DEFAULT_STRATEGY.to_string(),
        }
    }
}

/// Outcome statistics of a completed training run.
#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// Entries in the store after the merge.
    pub total_encodings: usize,
    /// Entries appended by this run.
    pub new_encodings: usize,
    /// Images deleted because no face was found.
    pub images_deleted: usize,
    /// Images skipped after decode/extraction errors (files retained).
    pub images_skipped: usize,
    /// Neighbor count the classifier was fitted with.
    pub neighbor_count: usize,
}

/// Run one incremental training pass.
///
/// Returns the run report; fails without touching the store or the model
/// artifact when the merged snapshot is empty.
#[instrument(level = "info", skip_all, fields(
    train_root = %config.train_root.display(),
    extractor = extractor.name(),
))]
pub fn train_incremental(
    config: &TrainerConfig,
    extractor: &dyn FaceExtractor,
) -> Result<TrainReport> {
    let mut snapshot = StoreSnapshot::load(&config.store_path)?;
    let prior = snapshot.len();

    let mut report = TrainReport::default();

    for user_dir in user_directories(&config.train_root)? {
        let folder_name = user_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let label = label_from_folder_name(&folder_name);
        info!(folder = %folder_name, %label, "Training user");

        for image_path in image_files_in_folder(&user_dir)? {
            process_image(&image_path, &label, extractor, &mut snapshot, &mut report);
        }
    }

    if snapshot.is_empty() {
        error!("No encodings found, training aborted");
        return Err(VisageError::EmptySnapshot);
    }

    snapshot.save(&config.store_path)?;

    let classifier = KnnClassifier::fit(&snapshot, config.n_neighbors, &config.index_strategy)?;
    classifier.save(&config.model_path)?;

    report.total_encodings = snapshot.len();
    report.new_encodings = snapshot.len() - prior;
    report.neighbor_count = classifier.k();

    info!(
        total = report.total_encodings,
        new = report.new_encodings,
        deleted = report.images_deleted,
        skipped = report.images_skipped,
        k = report.neighbor_count,
        "Training run complete"
    );
    Ok(report)
}

/// Decode one image and fold the extraction outcome into the snapshot.
///
/// `Embedded` appends, `NoFaceFound` deletes the source file, `Failed`
/// skips with the file retained. Decode errors are failures, never
/// deletions: a file we could not even read may be recoverable, while a
/// cleanly decoded image with no detectable face is permanently unusable.
fn process_image(
    path: &Path,
    label: &str,
    extractor: &dyn FaceExtractor,
    snapshot: &mut StoreSnapshot,
    report: &mut TrainReport,
) {
    let outcome = match decode_image(path) {
        Ok(image) => extract_outcome(extractor, &image),
        Err(e) => ExtractionOutcome::Failed(e.to_string()),
    };

    match outcome {
        ExtractionOutcome::Embedded(embedding) => {
            snapshot.append(embedding, label.to_string());
            info!(path = %path.display(), %label, "Trained face");
        }
        ExtractionOutcome::NoFaceFound => {
            warn!(path = %path.display(), "No face found, deleting image");
            if remove_unusable_image(path) {
                report.images_deleted += 1;
            } else {
                report.images_skipped += 1;
            }
        }
        ExtractionOutcome::Failed(reason) => {
            error!(path = %path.display(), %reason, "Error processing image, skipping");
            report.images_skipped += 1;
        }
    }
}

/// Deletes an image with no detectable face. Returns whether the file is
/// actually gone; a failed removal leaves a retry for the next run.
fn remove_unusable_image(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete image");
            false
        }
    }
}

fn decode_image(path: &Path) -> Result<image::RgbImage> {
    let decoded = image::open(path)?;
    Ok(decoded.to_rgb8())
}

/// Sub-directories of the training root, sorted by name for a stable walk
/// order.
fn user_directories(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(VisageError::InvalidTrainRoot(root.to_path_buf()));
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Image files directly inside `folder`, filtered by extension.
fn image_files_in_folder(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedding, EMBEDDING_DIM};
    use crate::extract::MockExtractor;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn embedding_with(first: f32) -> Embedding {
        let mut v = vec![0.0_f32; EMBEDDING_DIM];
        v[0] = first;
        Embedding::new(v).unwrap()
    }

    fn write_png(path: &Path) {
        RgbImage::from_pixel(8, 8, Rgb([100, 120, 140]))
            .save(path)
            .unwrap();
    }

    fn config_in(temp: &TempDir) -> TrainerConfig {
        let train_root = temp.path().join("train_images");
        fs::create_dir_all(&train_root).unwrap();
        TrainerConfig::new(train_root, temp.path())
    }

    #[test]
    fn test_valid_images_are_appended() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let user_dir = config.train_root.join("7_Jane Doe");
        fs::create_dir(&user_dir).unwrap();
        write_png(&user_dir.join("a.png"));
        write_png(&user_dir.join("b.png"));

        let extractor = MockExtractor::faces(vec![embedding_with(1.0)]);
        let report = train_incremental(&config, &extractor).unwrap();

        assert_eq!(report.total_encodings, 2);
        assert_eq!(report.new_encodings, 2);
        assert_eq!(report.images_deleted, 0);
        assert_eq!(report.images_skipped, 0);

        let snapshot = StoreSnapshot::load(&config.store_path).unwrap();
        assert_eq!(snapshot.labels(), ["Jane Doe", "Jane Doe"]);
        assert!(config.model_path.exists());
    }

    #[test]
    fn test_no_face_deletes_image_and_appends_nothing() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let user_dir = config.train_root.join("1_Alice");
        fs::create_dir(&user_dir).unwrap();
        let doomed = user_dir.join("blank.png");
        write_png(&doomed);

        let extractor = MockExtractor::no_faces();
        let err = train_incremental(&config, &extractor).unwrap_err();

        // Nothing embeddable anywhere, so the run aborts overall, but the
        // no-face cleanup must already have removed the file.
        assert!(matches!(err, VisageError::EmptySnapshot));
        assert!(!doomed.exists(), "no-face image should be deleted");
        assert!(!config.store_path.exists(), "store must not be written");
        assert!(!config.model_path.exists(), "artifact must not be written");
    }

    #[test]
    fn test_failed_removal_is_reported() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("blank.png");
        write_png(&present);
        let missing = temp.path().join("already_gone.png");

        assert!(remove_unusable_image(&present));
        assert!(!present.exists());
        // A removal that fails must not be reported as a deletion; the
        // caller counts it as a skip instead.
        assert!(!remove_unusable_image(&missing));
    }

    #[test]
    fn test_extraction_error_keeps_file() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let user_dir = config.train_root.join("1_Alice");
        fs::create_dir(&user_dir).unwrap();
        let kept = user_dir.join("corrupt.png");
        write_png(&kept);

        let extractor = MockExtractor::failing("backend offline");
        let err = train_incremental(&config, &extractor).unwrap_err();

        assert!(matches!(err, VisageError::EmptySnapshot));
        assert!(kept.exists(), "errored image must not be deleted");
    }

    #[test]
    fn test_decode_failure_is_skip_not_delete() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let user_dir = config.train_root.join("2_Bob");
        fs::create_dir(&user_dir).unwrap();
        let garbage = user_dir.join("notreally.jpg");
        fs::write(&garbage, b"this is not a jpeg").unwrap();
        write_png(&user_dir.join("ok.png"));

        let extractor = MockExtractor::faces(vec![embedding_with(1.0)]);
        let report = train_incremental(&config, &extractor).unwrap();

        assert!(garbage.exists(), "undecodable file must be retained");
        assert_eq!(report.images_skipped, 1);
        assert_eq!(report.total_encodings, 1);
    }

    #[test]
    fn test_empty_root_and_store_aborts() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);

        let extractor = MockExtractor::faces(vec![embedding_with(1.0)]);
        let err = train_incremental(&config, &extractor).unwrap_err();

        assert!(matches!(err, VisageError::EmptySnapshot));
        assert!(!config.model_path.exists());
        assert!(!config.store_path.exists());
    }

    #[test]
    fn test_prior_store_nine_plus_seven_gives_k_four() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);

        // Seed the store with nine prior encodings.
        let mut prior = StoreSnapshot::default();
        for i in 0..9 {
            prior.append(embedding_with(i as f32), "veteran".into());
        }
        prior.save(&config.store_path).unwrap();

        let user_dir = config.train_root.join("3_Newcomer");
        fs::create_dir(&user_dir).unwrap();
        for i in 0..7 {
            write_png(&user_dir.join(format!("img{i}.png")));
        }

        let extractor = MockExtractor::faces(vec![embedding_with(50.0)]);
        let report = train_incremental(&config, &extractor).unwrap();

        assert_eq!(report.total_encodings, 16);
        assert_eq!(report.new_encodings, 7);
        assert_eq!(report.neighbor_count, 4);
    }

    #[test]
    fn test_non_image_files_are_ignored() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let user_dir = config.train_root.join("4_Carol");
        fs::create_dir(&user_dir).unwrap();
        fs::write(user_dir.join("notes.txt"), b"not an image").unwrap();
        write_png(&user_dir.join("face.jpeg"));

        let extractor = MockExtractor::faces(vec![embedding_with(1.0)]);
        let report = train_incremental(&config, &extractor).unwrap();

        assert_eq!(report.total_encodings, 1);
        assert!(user_dir.join("notes.txt").exists());
    }

    #[test]
    fn test_missing_train_root_is_error() {
        let temp = TempDir::new().unwrap();
        let config = TrainerConfig::new(temp.path().join("nope"), temp.path());
        let extractor = MockExtractor::no_faces();
        let err = train_incremental(&config, &extractor).unwrap_err();
        assert!(matches!(err, VisageError::InvalidTrainRoot(_)));
    }
}
