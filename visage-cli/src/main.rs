//! Visage CLI - incremental face recognition training pipeline.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use visage_core::{
    prune_missing_images, write_metadata, FetchConfig, IndexStrategyFactory, TrainerConfig,
    DEFAULT_STRATEGY,
};

mod commands;
mod exit_codes;

#[derive(Parser)]
#[command(name = "visage")]
#[command(author, version, about = "Face recognition training pipeline", long_about = None)]
struct Cli {
    /// Run without downloading images
    #[arg(long)]
    dry_run: bool,

    /// Directory for downloads, the encoding store, and the model
    #[arg(long, default_value = "shared")]
    output_dir: PathBuf,

    /// Only download images, skip training
    #[arg(long)]
    only_download: bool,

    /// Only train, skip downloading
    #[arg(long, conflicts_with = "only_download")]
    only_train: bool,

    /// API URL for fetching image data
    #[arg(long, required_unless_present = "only_train")]
    api_url: Option<String>,

    /// HTTP headers for the API call, as a JSON object string
    #[arg(long, default_value = r#"{"Content-Type": "application/json"}"#)]
    headers: String,

    /// Number of neighbors for KNN (default: round(sqrt(N)))
    #[arg(long)]
    n_neighbors: Option<usize>,

    /// Nearest-neighbor index strategy
    #[arg(long, default_value = DEFAULT_STRATEGY)]
    knn_index: String,

    /// File name (under the output directory) for image metadata
    #[arg(long, default_value = "user-data.json")]
    output_json: String,

    /// Training folder name under the output directory
    #[arg(long, default_value = "train_images")]
    train_folder_name: String,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Suppress user-facing output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(exit_codes::exit_code_for(&err));
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Reject configuration problems before any processing begins.
    let headers: HashMap<String, String> = serde_json::from_str(&cli.headers)
        .context("Failed to parse --headers as a JSON object")?;
    if !IndexStrategyFactory::known_strategies().contains(&cli.knn_index.as_str()) {
        bail!(visage_core::VisageError::UnknownStrategy(cli.knn_index));
    }

    let train_root = cli.output_dir.join(&cli.train_folder_name);
    let metadata_path = cli.output_dir.join(&cli.output_json);

    let mut user_data = None;
    if !cli.only_train {
        // required_unless_present guarantees the URL here
        let api_url = cli.api_url.clone().unwrap_or_default();
        let fetch_config = FetchConfig {
            api_url,
            headers,
            dry_run: cli.dry_run,
            ..FetchConfig::default()
        };
        user_data = Some(commands::fetch::execute(fetch_config, &train_root, cli.quiet).await?);
    }

    if !cli.only_download {
        let mut trainer_config = TrainerConfig::new(train_root, &cli.output_dir);
        trainer_config.n_neighbors = cli.n_neighbors;
        trainer_config.index_strategy = cli.knn_index.clone();
        commands::train::execute(trainer_config, cli.quiet)?;
    }

    // Metadata only lists files that survived training's no-face cleanup.
    if let Some(mut user_data) = user_data {
        if !user_data.is_empty() {
            prune_missing_images(&mut user_data);
            write_metadata(&metadata_path, &user_data)
                .context("Failed to write user image metadata")?;
        }
    }

    Ok(())
}
