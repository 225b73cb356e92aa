//! Utility functions for text cleanup, logging, and file system checks.
//!
//! This module provides helpers used throughout the pipeline:
//! - HTML stripping for feed descriptions
//! - String truncation for log output
//! - JSON error detection for handling truncated model responses
//! - Output directory validation

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Strip HTML tags from a fragment and collapse whitespace.
///
/// Feed descriptions routinely arrive as HTML (`<p>`, `<a>`, entities).
/// The fragment is parsed and only its text nodes are kept, so entities
/// are decoded and tags of any nesting depth disappear.
///
/// # Arguments
///
/// * `fragment` - HTML or plain text
///
/// # Returns
///
/// The visible text with runs of whitespace collapsed to single spaces.
pub fn strip_html(fragment: &str) -> String {
    let document = scraper::Html::parse_fragment(fragment);
    let joined = document.root_element().text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string for logging purposes.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if it fits, otherwise a truncated version with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…(+{} bytes)", &s[..end], s.len() - end)
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When a model response is cut off by a token limit, parsing fails with
/// an EOF error rather than a syntax error. Callers use this to decide
/// whether a single re-ask is worth attempting.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then verifies writability by creating
/// and removing a probe file. Called once at startup so a bad output path
/// fails before any network work happens.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the probe write
/// fails (permissions, read-only filesystem).
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    let probe_path = format!("{}/..__briefing_probe__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
