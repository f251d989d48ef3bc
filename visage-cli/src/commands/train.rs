//! Training step: merge new embeddings and rebuild the classifier.

use anyhow::{Context, Result};
use colored::Colorize;
use visage_core::{train_incremental, GridEmbedder, TrainReport, TrainerConfig};

/// Execute one incremental training run and print its report.
pub fn execute(config: TrainerConfig, quiet: bool) -> Result<TrainReport> {
    let extractor = GridEmbedder::new();
    let report = train_incremental(&config, &extractor).context("Training run failed")?;

    if !quiet {
        println!();
        println!("{}", "Training complete.".green().bold());
        println!();
        println!(
            "   {} {} ({} new this run)",
            "Encodings:".dimmed(),
            report.total_encodings,
            report.new_encodings
        );
        println!(
            "   {} {} deleted (no face), {} skipped (errors)",
            "Images:".dimmed(),
            report.images_deleted,
            report.images_skipped
        );
        println!(
            "   {} k = {} over '{}' index",
            "Classifier:".dimmed(),
            report.neighbor_count,
            config.index_strategy
        );
        println!(
            "   {} {}",
            "Model saved:".dimmed(),
            config.model_path.display()
        );
    }

    Ok(report)
}
