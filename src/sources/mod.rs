//! News source gatherers feeding the curation prompt.
//!
//! Each gatherer implements the same per-category contract, [`GatherItems`],
//! so the news orchestrator can run against either source style (or a test
//! fake) without caring which is configured.
//!
//! # Gatherers
//!
//! | Gatherer | Module | Method | Notes |
//! |----------|--------|--------|-------|
//! | RSS feeds | [`feeds`] | RSS 2.0 over HTTP | quick-xml parsing; 48-hour recency window |
//! | Article API | [`articles`] | NewsAPI-style JSON | top-headlines or everything per category |
//!
//! # Common Patterns
//!
//! - Concurrent fetching with `futures::stream`, bounded parallelism
//! - Graceful degradation: a failed feed or source is logged and skipped
//! - Headline de-duplication via [`canonical_title`]

use crate::error::FetchError;
use crate::models::{Category, SourceItem};

pub mod articles;
pub mod feeds;

/// Trait for gathering raw news items for one category.
///
/// Implementors return whatever usable items they found; an `Err` means
/// the whole category's gather failed (the orchestrator logs it and
/// continues with the other categories).
pub trait GatherItems {
    /// Collect recent items for `category`.
    async fn items(&self, category: Category) -> Result<Vec<SourceItem>, FetchError>;
}

/// Canonical form of a headline for de-duplication across sources.
///
/// Lowercases, strips everything but letters/digits/spaces, and collapses
/// whitespace, so reprints of the same story ("Fed Holds Rates Steady!"
/// vs "Fed holds rates steady") collapse to one key.
pub fn canonical_title(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_title_normalizes_case_and_punctuation() {
        assert_eq!(
            canonical_title("Fed Holds Rates Steady!"),
            "fed holds rates steady"
        );
        assert_eq!(
            canonical_title("Fed holds rates steady"),
            "fed holds rates steady"
        );
    }

    #[test]
    fn test_canonical_title_collapses_whitespace() {
        assert_eq!(canonical_title("  spaced \t out\ntitle "), "spaced out title");
    }

    #[test]
    fn test_canonical_title_keeps_digits() {
        assert_eq!(canonical_title("S&P 500 gains 1.2%"), "sp 500 gains 12");
    }
}
