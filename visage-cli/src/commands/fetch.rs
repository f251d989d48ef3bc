//! Download step: pull pending users' images from the remote API.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;
use visage_core::{FetchClient, FetchConfig, UserImageData};

/// Execute the fetch step, populating `train_root` with per-user folders.
pub async fn execute(
    config: FetchConfig,
    train_root: &Path,
    quiet: bool,
) -> Result<UserImageData> {
    let dry_run = config.dry_run;
    let client = FetchClient::new(config).context("Failed to create fetch client")?;

    let user_data = client
        .fetch_and_download(train_root)
        .await
        .context("Failed to fetch user images")?;

    let image_count: usize = user_data.values().map(|r| r.images.len()).sum();
    info!(
        users = user_data.len(),
        images = image_count,
        "Fetch step complete"
    );

    if !quiet {
        if dry_run {
            println!(
                "{} {} pending user(s) found (dry run, nothing downloaded)",
                "Fetched:".dimmed(),
                user_data.len()
            );
        } else {
            println!(
                "{} {} image(s) for {} pending user(s)",
                "Downloaded:".dimmed(),
                image_count,
                user_data.len()
            );
        }
    }

    Ok(user_data)
}
