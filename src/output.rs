//! JSON output generation.
//!
//! This module serializes the assembled briefing to a JSON file for
//! consumption by the dashboard frontend.
//!
//! # Output Structure
//!
//! One file per local date:
//! ```text
//! output_dir/
//! ├── 2025-08-11.json
//! └── 2025-08-12.json
//! ```
//!
//! A second run on the same day overwrites the day's file; the cache
//! layer is what keeps reruns cheap, not this writer.

use crate::models::Briefing;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`Briefing`] to `{output_dir}/{local_date}.json`.
///
/// Creates the output directory if needed and writes the serialized
/// briefing.
///
/// # Arguments
///
/// * `briefing` - The assembled cards and tickers to serialize
/// * `output_dir` - Base directory for JSON output
///
/// # Returns
///
/// The path written, or an error if directory creation or file writing
/// fails.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_briefing(
    briefing: &Briefing,
    output_dir: &str,
) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string(briefing)?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(%output_dir, error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let path = format!("{}/{}.json", output_dir, briefing.local_date);
    info!(path = %path, "Writing briefing JSON");
    fs::write(&path, json).await?;
    info!(path = %path, cards = briefing.cards.len(), tickers = briefing.tickers.len(), "Wrote briefing file");

    Ok(path)
}
