//! Command-line interface definitions for the daily briefing generator.
//!
//! This module defines the CLI arguments and options using the `clap` crate.

use clap::Parser;

/// Command-line arguments for the daily briefing generator.
///
/// Runtime configuration beyond these flags lives in the optional YAML
/// config file; the flags here cover the output location and the cache
/// maintenance switches.
///
/// # Examples
///
/// ```sh
/// # Basic usage with the required output directory
/// daily_briefing -o ./briefings
///
/// # Custom config and an earlier refresh hour
/// daily_briefing -o ./briefings -c briefing.yaml --refresh-hour 6
///
/// # Inspect the cache without fetching
/// daily_briefing -o ./briefings --cache-info
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for the briefing JSON file
    #[arg(short, long)]
    pub output_dir: String,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the refresh hour (0-23) for both news and market caches
    #[arg(long, env = "BRIEFING_REFRESH_HOUR")]
    pub refresh_hour: Option<u32>,

    /// Delete both cache entries before fetching
    #[arg(long)]
    pub clear_cache: bool,

    /// Log cache status for both entries, then exit without fetching
    #[arg(long)]
    pub cache_info: bool,
}
