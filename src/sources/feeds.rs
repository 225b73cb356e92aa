//! RSS feed gatherer.
//!
//! Fetches the configured RSS 2.0 feeds for a category and parses their
//! `<item>` entries with quick-xml. Feeds are fetched concurrently; a feed
//! that fails to download or parse is skipped, not fatal. Items older than
//! the recency window, or missing a title, link, or parseable date, are
//! dropped. Atom feeds simply yield zero items (no `<item>` elements),
//! which downstream code tolerates.

use crate::error::FetchError;
use crate::models::{Category, SourceItem};
use crate::sources::{GatherItems, canonical_title};
use crate::utils::strip_html;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tracing::{debug, info, instrument, warn};

/// How far back an item may be dated and still make the briefing.
const RECENCY_WINDOW_HOURS: i64 = 48;
/// Concurrent feed fetches within one category.
const FEED_PARALLELISM: usize = 4;
/// Longest description carried into the prompt, in characters.
const MAX_SUMMARY_CHARS: usize = 500;

/// One configured feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedSpec {
    /// Display name, used as the item source and in citations.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// The briefing category this feed serves.
    pub category: Category,
}

/// The stock feed set used when the config file does not override it.
pub fn default_feeds() -> Vec<FeedSpec> {
    [
        (
            "BBC News",
            "https://feeds.bbci.co.uk/news/world/rss.xml",
            Category::Top,
        ),
        ("NPR", "https://feeds.npr.org/1001/rss.xml", Category::Top),
        ("Wired", "https://www.wired.com/feed/rss", Category::Tech),
        (
            "The Verge",
            "https://www.theverge.com/rss/index.xml",
            Category::Tech,
        ),
        (
            "ESPN",
            "https://www.espn.com/espn/rss/news",
            Category::Sports,
        ),
        (
            "CNBC",
            "https://www.cnbc.com/id/100003114/device/rss/rss.html",
            Category::Markets,
        ),
    ]
    .into_iter()
    .map(|(name, url, category)| FeedSpec {
        name: name.to_string(),
        url: url.to_string(),
        category,
    })
    .collect()
}

/// Gatherer that pulls items from RSS feeds.
#[derive(Debug)]
pub struct RssGatherer {
    http: reqwest::Client,
    feeds: Vec<FeedSpec>,
}

impl RssGatherer {
    /// Build a gatherer over `feeds` with a per-request timeout.
    pub fn new(feeds: Vec<FeedSpec>, timeout: StdDuration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("daily_briefing/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, feeds }
    }

    async fn fetch_feed(&self, feed: &FeedSpec) -> Result<Vec<SourceItem>, FetchError> {
        let response = self.http.get(&feed.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: format!("feed fetch failed for {}", feed.url),
            });
        }
        let xml = response.text().await?;
        let items = parse_feed_items(&xml, feed, Utc::now());
        debug!(feed = %feed.name, count = items.len(), "parsed feed items");
        Ok(items)
    }
}

impl GatherItems for RssGatherer {
    #[instrument(level = "info", skip_all, fields(category = %category))]
    async fn items(&self, category: Category) -> Result<Vec<SourceItem>, FetchError> {
        let feeds: Vec<&FeedSpec> = self
            .feeds
            .iter()
            .filter(|feed| feed.category == category)
            .collect();
        if feeds.is_empty() {
            debug!("no feeds configured for category");
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<SourceItem>> = stream::iter(feeds)
            .map(|feed| async move {
                match self.fetch_feed(feed).await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(feed = %feed.name, error = %e, "feed fetch failed; skipping");
                        Vec::new()
                    }
                }
            })
            .buffered(FEED_PARALLELISM)
            .collect()
            .await;

        let items: Vec<SourceItem> = batches
            .into_iter()
            .flatten()
            .unique_by(|item| canonical_title(&item.title))
            .collect();
        info!(count = items.len(), "gathered feed items");
        Ok(items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ItemField {
    None,
    Title,
    Link,
    PubDate,
    Description,
}

#[derive(Debug, Default)]
struct ItemDraft {
    title: String,
    link: String,
    pub_date: String,
    description: String,
}

impl ItemDraft {
    /// Append one decoded chunk to the active field. Chunks concatenate
    /// verbatim; assembled fields are trimmed in [`ItemDraft::finish`].
    fn append(&mut self, field: ItemField, text: &str) {
        let target = match field {
            ItemField::Title => &mut self.title,
            ItemField::Link => &mut self.link,
            ItemField::PubDate => &mut self.pub_date,
            ItemField::Description => &mut self.description,
            ItemField::None => return,
        };
        target.push_str(text);
    }

    fn finish(&self, feed: &FeedSpec, cutoff: DateTime<Utc>) -> Option<SourceItem> {
        let title = self.title.trim();
        let link = self.link.trim();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        let published = parse_item_date(&self.pub_date)?;
        if published < cutoff {
            return None;
        }
        let summary = if self.description.trim().is_empty() {
            None
        } else {
            let text: String = strip_html(&self.description)
                .chars()
                .take(MAX_SUMMARY_CHARS)
                .collect();
            if text.is_empty() { None } else { Some(text) }
        };
        Some(SourceItem {
            title: title.to_string(),
            url: link.to_string(),
            source: feed.name.clone(),
            category: feed.category,
            published_at: published.to_rfc3339(),
            summary,
        })
    }
}

/// Parse RSS `<item>` elements out of a feed body.
///
/// Field content is assembled from text, CDATA, and entity-reference
/// events (`&amp;`, `&#233;`, and friends resolve in place). Only the
/// first occurrence of each field element per item counts, and
/// namespace-prefixed lookalikes such as `<media:title>` do not match.
/// Only items dated within the recency window (relative to `now`) and
/// carrying both a title and a link survive. Malformed XML stops parsing
/// but keeps whatever was already collected.
fn parse_feed_items(xml: &str, feed: &FeedSpec, now: DateTime<Utc>) -> Vec<SourceItem> {
    let cutoff = now - Duration::hours(RECENCY_WINDOW_HOURS);
    let mut reader = Reader::from_str(xml);

    let mut items = Vec::new();
    let mut in_item = false;
    let mut field = ItemField::None;
    let mut draft = ItemDraft::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => {
                    in_item = true;
                    field = ItemField::None;
                    draft = ItemDraft::default();
                }
                b"title" if in_item && draft.title.is_empty() => field = ItemField::Title,
                b"link" if in_item && draft.link.is_empty() => field = ItemField::Link,
                b"pubDate" if in_item && draft.pub_date.is_empty() => field = ItemField::PubDate,
                b"description" if in_item && draft.description.is_empty() => {
                    field = ItemField::Description
                }
                _ => field = ItemField::None,
            },
            Ok(Event::Text(e)) => {
                if in_item && field != ItemField::None {
                    if let Ok(text) = e.decode() {
                        draft.append(field, &text);
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_item && field != ItemField::None {
                    if let Some(text) = resolve_reference(&e) {
                        draft.append(field, &text);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if in_item && field != ItemField::None {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    draft.append(field, &text);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    in_item = false;
                    if let Some(item) = draft.finish(feed, cutoff) {
                        items.push(item);
                    }
                    draft = ItemDraft::default();
                }
                field = ItemField::None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "feed XML malformed; keeping items parsed so far");
                break;
            }
            _ => {}
        }
    }
    items
}

/// Resolve an entity-reference event to its replacement text.
///
/// Handles numeric character references (`&#233;`, `&#x2019;`) and the
/// five predefined XML entities. Unknown references are dropped.
fn resolve_reference(reference: &BytesRef<'_>) -> Option<String> {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return Some(ch.to_string());
    }
    let name = reference.decode().ok()?;
    let resolved = resolve_predefined_entity(&name);
    if resolved.is_none() {
        debug!(entity = %name, "unknown entity reference in feed; dropping");
    }
    resolved.map(str::to_string)
}

fn parse_item_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_feed() -> FeedSpec {
        FeedSpec {
            name: "BBC News".to_string(),
            url: "https://feeds.bbci.co.uk/news/world/rss.xml".to_string(),
            category: Category::Top,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 12, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_feed_items_basic() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
                <title>BBC News</title>
                <item>
                    <title>World leaders meet</title>
                    <link>https://www.bbc.com/news/one</link>
                    <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
                    <description>&lt;p&gt;Talks &lt;b&gt;continue&lt;/b&gt; today.&lt;/p&gt;</description>
                </item>
                <item>
                    <title>Second story</title>
                    <link>https://www.bbc.com/news/two</link>
                    <pubDate>Tue, 12 Aug 2025 08:00:00 GMT</pubDate>
                </item>
            </channel></rss>"#;

        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "World leaders meet");
        assert_eq!(items[0].url, "https://www.bbc.com/news/one");
        assert_eq!(items[0].source, "BBC News");
        assert_eq!(items[0].category, Category::Top);
        assert_eq!(items[0].summary.as_deref(), Some("Talks continue today."));
        assert_eq!(items[1].summary, None);
    }

    #[test]
    fn test_parse_feed_items_drops_old_entries() {
        let xml = r#"<rss><channel><item>
            <title>Ancient news</title>
            <link>https://www.bbc.com/news/old</link>
            <pubDate>Fri, 01 Aug 2025 10:00:00 GMT</pubDate>
        </item></channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_feed_items_requires_title_link_and_date() {
        let xml = r#"<rss><channel>
            <item>
                <title>No link</title>
                <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
            </item>
            <item>
                <link>https://www.bbc.com/news/no-title</link>
                <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
            </item>
            <item>
                <title>No date</title>
                <link>https://www.bbc.com/news/no-date</link>
            </item>
        </channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_feed_items_handles_cdata_and_entities() {
        let xml = r#"<rss><channel><item>
            <title><![CDATA[AT&T expands fiber <fast>]]></title>
            <link>https://www.bbc.com/news/att</link>
            <pubDate>2025-08-12T09:00:00Z</pubDate>
        </item></channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "AT&T expands fiber <fast>");
        // RFC 3339 dates are accepted alongside RFC 2822.
        assert!(items[0].published_at.starts_with("2025-08-12"));
    }

    #[test]
    fn test_parse_feed_items_resolves_entity_references() {
        let xml = r#"<rss><channel><item>
            <title>Fed &amp; Treasury press caf&#233; briefing</title>
            <link>https://www.bbc.com/news/fed</link>
            <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
            <description>Rates &lt;b&gt;hold&lt;/b&gt; at 5%.</description>
        </item></channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert_eq!(items.len(), 1);
        // Spacing around resolved references survives.
        assert_eq!(items[0].title, "Fed & Treasury press café briefing");
        assert_eq!(items[0].summary.as_deref(), Some("Rates hold at 5%."));
    }

    #[test]
    fn test_parse_feed_items_ignores_namespaced_duplicate_fields() {
        let xml = r#"<rss xmlns:media="http://search.yahoo.com/mrss/"><channel><item>
            <title>Real headline &amp; context</title>
            <media:title>Promo artwork caption</media:title>
            <link>https://www.bbc.com/news/media</link>
            <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
        </item></channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Real headline & context");
    }

    #[test]
    fn test_parse_feed_items_keeps_first_of_duplicate_fields() {
        let xml = r#"<rss><channel><item>
            <title>First headline</title>
            <title>Second headline</title>
            <link>https://www.bbc.com/news/dup</link>
            <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
        </item></channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "First headline");
    }

    #[test]
    fn test_parse_feed_items_tolerates_atom_documents() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><title>Atom entry</title></entry>
        </feed>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_feed_items_ignores_channel_level_title() {
        let xml = r#"<rss><channel>
            <title>Channel title leaks?</title>
            <item>
                <title>Real item</title>
                <link>https://www.bbc.com/news/real</link>
                <pubDate>Mon, 11 Aug 2025 14:30:00 GMT</pubDate>
            </item>
        </channel></rss>"#;
        let items = parse_feed_items(xml, &test_feed(), fixed_now());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Real item");
    }

    #[test]
    fn test_parse_item_date_both_formats() {
        assert!(parse_item_date("Mon, 11 Aug 2025 14:30:00 GMT").is_some());
        assert!(parse_item_date("2025-08-11T14:30:00+00:00").is_some());
        assert!(parse_item_date("yesterday-ish").is_none());
        assert!(parse_item_date("").is_none());
    }

    #[test]
    fn test_default_feeds_cover_core_categories() {
        let feeds = default_feeds();
        assert!(feeds.iter().any(|f| f.category == Category::Top));
        assert!(feeds.iter().any(|f| f.category == Category::Tech));
        assert!(feeds.iter().any(|f| f.category == Category::Sports));
        assert!(feeds.iter().any(|f| f.category == Category::Markets));
    }

    #[tokio::test]
    async fn test_items_with_no_feeds_for_category_is_empty_without_network() {
        let gatherer = RssGatherer::new(vec![], StdDuration::from_secs(1));
        let items = gatherer.items(Category::Weather).await.unwrap();
        assert!(items.is_empty());
    }
}
