//! Data models for briefing cards, market tickers, and gathered source material.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Category`]: The fixed set of briefing categories and their display order
//! - [`Card`]: One curated briefing card, as rendered by downstream dashboards
//! - [`TickerItem`]: One market-strip entry for a tracked symbol
//! - [`SourceItem`]: A raw news item gathered from a feed or article API
//! - [`Briefing`]: The combined daily artifact written to disk
//!
//! Wire-facing structs use camelCase field names (via serde renames) to match
//! the JSON shape the model is prompted for and the quote APIs return.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A briefing category.
///
/// The briefing always contains one card per category in
/// [`Category::BRIEFING_ORDER`]. `Org` is recognized on input (some feeds
/// and older payloads tag organizational stories with it) but is not part
/// of the daily order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// General top stories.
    #[default]
    Top,
    /// Technology news.
    Tech,
    /// Sports news.
    Sports,
    /// Markets and economy.
    Markets,
    /// Local/regional stories.
    Local,
    /// Weather outlooks.
    Weather,
    /// Organizational/workplace stories (input-only).
    Org,
}

impl Category {
    /// The fixed category order of a daily briefing: one card per entry.
    pub const BRIEFING_ORDER: [Category; 6] = [
        Category::Top,
        Category::Tech,
        Category::Sports,
        Category::Markets,
        Category::Local,
        Category::Weather,
    ];

    /// Parse a category from a raw string, tolerating case and padding.
    ///
    /// # Returns
    ///
    /// The matching category, or `None` for anything unrecognized. Callers
    /// decide what to substitute; this function never defaults.
    pub fn parse(raw: &str) -> Option<Category> {
        match raw.trim().to_lowercase().as_str() {
            "top" => Some(Category::Top),
            "tech" => Some(Category::Tech),
            "sports" => Some(Category::Sports),
            "markets" => Some(Category::Markets),
            "local" => Some(Category::Local),
            "weather" => Some(Category::Weather),
            "org" => Some(Category::Org),
            _ => None,
        }
    }

    /// The lowercase identifier used in JSON payloads and prompts.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Top => "top",
            Category::Tech => "tech",
            Category::Sports => "sports",
            Category::Markets => "markets",
            Category::Local => "local",
            Category::Weather => "weather",
            Category::Org => "org",
        }
    }

    /// The capitalized display form, used when synthesizing citation labels.
    pub fn label(self) -> &'static str {
        match self {
            Category::Top => "Top",
            Category::Tech => "Tech",
            Category::Sports => "Sports",
            Category::Markets => "Markets",
            Category::Local => "Local",
            Category::Weather => "Weather",
            Category::Org => "Org",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// One curated briefing card.
///
/// Cards are produced by the normalizer, never constructed ad hoc, so a
/// card always has a category from the fixed order, a timestamp, and at
/// least structurally valid (possibly empty) collections.
///
/// # Conventions
///
/// * `headline` runs ~80-90 characters, `summary` ~180-350 (prompt-level
///   conventions, not enforced here).
/// * `citations` entries are formatted `"Source Name — URL"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Card {
    /// Identifier unique within one briefing (e.g. `card-0`).
    pub id: String,
    /// The story headline.
    pub headline: String,
    /// A 2-3 sentence summary of the story.
    pub summary: String,
    /// Short context bullets, at most 3.
    pub bullets: Vec<String>,
    /// The card's category; one per category per briefing.
    pub category: Category,
    /// ISO-8601 timestamp of the underlying story (or of normalization).
    pub timestamp: String,
    /// Formatted source citations, de-duplicated.
    pub citations: Vec<String>,
}

/// One market-strip entry.
///
/// Quote fields default independently to `0` when the upstream quote is
/// missing them, and `name` falls back to the symbol itself, so a ticker
/// row is always renderable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerItem {
    /// The ticker symbol, e.g. `AAPL`.
    pub symbol: String,
    /// Company or fund name for display.
    pub name: String,
    /// Last trade price.
    pub price: f64,
    /// Absolute change since previous close.
    pub change: f64,
    /// Percent change since previous close (already multiplied by 100).
    pub change_percent: f64,
}

/// A raw news item gathered from a feed or article API, before curation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    /// The item's original headline.
    pub title: String,
    /// Link to the full story.
    pub url: String,
    /// Human-readable source name (feed name or API source field).
    pub source: String,
    /// The category this item was gathered for.
    pub category: Category,
    /// Publication time, ISO-8601.
    pub published_at: String,
    /// HTML-stripped description, when the source provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// The combined daily briefing artifact.
///
/// Each run produces one `Briefing`, serialized to
/// `<output-dir>/<local_date>.json` for dashboards to consume.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Briefing {
    /// The local calendar date in `YYYY-MM-DD` format.
    pub local_date: String,
    /// The local wall-clock time the briefing was assembled.
    pub local_time: String,
    /// UTC generation timestamp, RFC 3339.
    pub generated_at: String,
    /// The six briefing cards, in [`Category::BRIEFING_ORDER`].
    pub cards: Vec<Card>,
    /// Market-strip entries, in configured symbol order.
    pub tickers: Vec<TickerItem>,
}
