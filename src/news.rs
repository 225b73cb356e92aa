//! Daily news curation.
//!
//! The orchestrator ties the news pipeline together: serve the six-card
//! briefing from cache when the refresh policy allows, otherwise gather
//! source items, ask the model to curate them, normalize whatever comes
//! back, cache it, and return it. Collaborator failures degrade in order
//! (stale cache, then an empty list) so the caller always gets a vector
//! rather than an error.

use crate::cache::CacheStore;
use crate::config::{NewsConfig, SourceMode};
use crate::error::FetchError;
use crate::llm::{ChatAsync, ChatPrompt};
use crate::models::{Card, Category, SourceItem};
use crate::normalize::{normalize_cards, parse_model_payload};
use crate::sources::{GatherItems, canonical_title};
use crate::utils::{looks_truncated, truncate_for_log};
use chrono::{Local, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{error, info, instrument, warn};

/// Cache key for the six-card briefing.
pub const NEWS_CACHE_KEY: &str = "daily-news-cards";
/// Concurrent per-category gathers in flight.
const GATHER_PARALLELISM: usize = 6;

const CURATOR_SYSTEM_PROMPT: &str = r#"You are a news curator. You will receive real article titles with publication times and URLs, grouped by category.

YOUR JOB: Select one story per category and write its summary and bullets. DO NOT modify headlines or invent details.

RULES:
1. Each input article has: title, url, source, category, publishedAt
2. Return EXACTLY 6 cards, one per category, in this order: top, tech, sports, markets, local, weather
3. Use the EXACT title of a supplied article as the headline
4. Write a 2-3 sentence summary (200-350 chars) that expands on the headline
5. DO NOT invent specific numbers, times, locations, names, or statistics
6. Write 2-3 bullet points about why this matters or key context
7. Cite every card as "Source Name — URL", using supplied items only
8. If a category has no supplied items, still emit its card with a brief general note and an empty citations array

Return ONLY a JSON array of 6 card objects:
{
  "id": "unique-id",
  "headline": "USE THE EXACT TITLE PROVIDED",
  "summary": "2-3 sentences expanding on the headline without inventing details",
  "bullets": ["2-3 context points", "not made-up facts"],
  "category": "top|tech|sports|markets|local|weather",
  "timestamp": "from input publishedAt",
  "citations": ["Source Name — URL"]
}"#;

const SEARCH_SYSTEM_PROMPT: &str = r#"You are a news curator with web search. Find today's most important stories yourself.

RULES:
1. Return EXACTLY 6 cards, one per category, in this order: top, tech, sports, markets, local, weather
2. Headlines must describe real, current stories
3. Write a 2-3 sentence summary (200-350 chars) per card
4. Write 2-3 bullet points of key context
5. Cite every card as "Source Name — URL" with the URL you found the story at

Return ONLY a JSON array of 6 card objects:
{
  "id": "unique-id",
  "headline": "...",
  "summary": "...",
  "bullets": ["...", "..."],
  "category": "top|tech|sports|markets|local|weather",
  "timestamp": "ISO 8601",
  "citations": ["Source Name — URL"]
}"#;

/// Produce today's briefing, preferring cache, degrading on failure.
///
/// # Returns
///
/// Always a card vector: fresh cards on success, the stale cached
/// briefing when curation fails, an empty vector when there is nothing
/// cached either.
#[instrument(level = "info", skip_all, fields(mode = ?config.mode))]
pub async fn fetch_daily_cards<G, C>(
    store: &CacheStore,
    gatherer: &G,
    chat: &C,
    config: &NewsConfig,
) -> Vec<Card>
where
    G: GatherItems,
    C: ChatAsync,
{
    // Snapshot before the policy read: a stale `get` deletes the entry,
    // and the curation-failed path still wants yesterday's cards.
    let fallback: Option<Vec<Card>> = store.peek(NEWS_CACHE_KEY);
    if let Some(cached) = store.get::<Vec<Card>>(NEWS_CACHE_KEY, config.refresh_hour) {
        info!(count = cached.len(), "serving cached briefing");
        return cached;
    }

    match curate_fresh(gatherer, chat, config).await {
        Ok(cards) => {
            info!(count = cards.len(), "curated fresh briefing");
            store.set(NEWS_CACHE_KEY, &cards, config.refresh_hour);
            cards
        }
        Err(e) => {
            error!(error = %e, "briefing curation failed");
            match fallback {
                Some(stale) => {
                    warn!(count = stale.len(), "serving stale briefing from cache");
                    stale
                }
                None => {
                    warn!("no cached briefing to fall back on");
                    Vec::new()
                }
            }
        }
    }
}

/// Gather, curate, and normalize one fresh briefing.
async fn curate_fresh<G, C>(
    gatherer: &G,
    chat: &C,
    config: &NewsConfig,
) -> Result<Vec<Card>, FetchError>
where
    G: GatherItems,
    C: ChatAsync,
{
    let items = match config.mode {
        SourceMode::Search => Vec::new(),
        SourceMode::Feeds | SourceMode::Articles => gather_sources(gatherer).await,
    };

    let prompt = build_prompt(config, &items);
    let text = chat.chat(&prompt).await?;

    let value = match parse_model_payload(&text) {
        Ok(value) => value,
        Err(e) if looks_truncated(&e) => {
            // One recovery round for a completion cut off mid-array.
            warn!(error = %e, "model output looks truncated; asking once more");
            let retry = chat.chat(&prompt).await?;
            parse_model_payload(&retry).unwrap_or_else(|e| {
                warn!(
                    error = %e,
                    preview = %truncate_for_log(&retry, 200),
                    "retried output still unparseable; normalizing null"
                );
                Value::Null
            })
        }
        Err(e) => {
            warn!(
                error = %e,
                preview = %truncate_for_log(&text, 200),
                "model output unparseable; normalizing null"
            );
            Value::Null
        }
    };

    Ok(normalize_cards(
        &value,
        &Category::BRIEFING_ORDER,
        &Utc::now().to_rfc3339(),
        &config.fallback_url,
    ))
}

/// Gather source items for every briefing category concurrently.
///
/// A category whose gatherer fails contributes nothing; items are
/// de-duplicated across categories by canonical title.
async fn gather_sources<G: GatherItems>(gatherer: &G) -> Vec<SourceItem> {
    let batches: Vec<Vec<SourceItem>> = stream::iter(Category::BRIEFING_ORDER)
        .map(|category| async move {
            match gatherer.items(category).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(category = %category, error = %e, "gather failed; continuing without category");
                    Vec::new()
                }
            }
        })
        .buffered(GATHER_PARALLELISM)
        .collect()
        .await;

    let items: Vec<SourceItem> = batches
        .into_iter()
        .flatten()
        .unique_by(|item| canonical_title(&item.title))
        .collect();
    info!(count = items.len(), "gathered source items");
    items
}

fn build_prompt(config: &NewsConfig, items: &[SourceItem]) -> ChatPrompt {
    match config.mode {
        SourceMode::Search => ChatPrompt {
            system: SEARCH_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Today is {}. Search for today's top stories and return the 6-card briefing JSON.",
                Local::now().format("%Y-%m-%d")
            ),
        },
        SourceMode::Feeds | SourceMode::Articles => ChatPrompt {
            system: CURATOR_SYSTEM_PROMPT.to_string(),
            user: sources_prompt(items, config.max_items_per_category),
        },
    }
}

/// Build the curation user prompt: the top items of each category as
/// pretty-printed JSON under an upper-case heading. With nothing gathered
/// at all the prompt degrades to a bare `[]`.
fn sources_prompt(items: &[SourceItem], max_per_category: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    let mut prompt = String::from(
        "Curate today's briefing from these REAL articles (published in the last 48h):\n",
    );
    for category in Category::BRIEFING_ORDER {
        let picks: Vec<&SourceItem> = items
            .iter()
            .filter(|item| item.category == category)
            .take(max_per_category)
            .collect();
        let block =
            serde_json::to_string_pretty(&picks).unwrap_or_else(|_| "[]".to_string());
        // Writing into a String cannot fail.
        writeln!(
            prompt,
            "\n{} (pick 1):\n{block}",
            category.slug().to_uppercase()
        )
        .unwrap();
    }
    prompt.push_str(
        "\nReturn a JSON array of exactly 6 cards, one per category, in order: top, tech, sports, markets, local, weather.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGatherer {
        items: Vec<SourceItem>,
        calls: AtomicUsize,
    }

    impl FakeGatherer {
        fn new(items: Vec<SourceItem>) -> Self {
            Self {
                items,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GatherItems for FakeGatherer {
        async fn items(&self, category: Category) -> Result<Vec<SourceItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .items
                .iter()
                .filter(|item| item.category == category)
                .cloned()
                .collect())
        }
    }

    struct FakeChat {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl FakeChat {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ChatAsync for FakeChat {
        async fn chat(&self, _prompt: &ChatPrompt) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(FetchError::Parse(message.clone())),
            }
        }
    }

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "daily_briefing_news_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn test_config() -> NewsConfig {
        NewsConfig {
            refresh_hour: 8,
            ..NewsConfig::default()
        }
    }

    fn item(title: &str, category: Category) -> SourceItem {
        SourceItem {
            title: title.to_string(),
            url: format!("https://example.com/{}", category.slug()),
            source: "Example Wire".to_string(),
            category,
            published_at: "2025-08-12T09:00:00Z".to_string(),
            summary: None,
        }
    }

    fn model_reply() -> String {
        let cards: Vec<Value> = Category::BRIEFING_ORDER
            .iter()
            .enumerate()
            .map(|(i, category)| {
                serde_json::json!({
                    "id": format!("story-{i}"),
                    "headline": format!("{} headline", category.label()),
                    "summary": "Something happened today.",
                    "bullets": ["It matters."],
                    "category": category.slug(),
                    "timestamp": "2025-08-12T09:00:00Z",
                    "citations": [format!("Example Wire — https://example.com/{}", category.slug())]
                })
            })
            .collect();
        serde_json::to_string(&cards).unwrap()
    }

    fn seed_stale_cards(dir: &PathBuf, cards: Vec<Card>) {
        fs::create_dir_all(dir).unwrap();
        let entry = CacheEntry {
            payload: cards,
            stored_at_epoch_millis: 0,
            last_fetch_date: "2000-01-01".to_string(),
        };
        fs::write(
            dir.join(format!("{NEWS_CACHE_KEY}.json")),
            serde_json::to_string(&entry).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_success_returns_six_cards_and_caches() {
        let store = CacheStore::new(test_dir("success"));
        let gatherer = FakeGatherer::new(vec![
            item("World leaders meet", Category::Top),
            item("Chips get faster", Category::Tech),
        ]);
        let chat = FakeChat::replying(&model_reply());
        let config = test_config();

        let cards = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        assert_eq!(cards.len(), 6);
        assert_eq!(cards[0].category, Category::Top);
        assert_eq!(cards[0].headline, "Top headline");
        assert_eq!(gatherer.calls.load(Ordering::SeqCst), 6);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);

        let cached: Option<Vec<Card>> = store.peek(NEWS_CACHE_KEY);
        assert_eq!(cached, Some(cards));
    }

    #[tokio::test]
    async fn test_fetch_served_from_cache_calls_nothing() {
        let store = CacheStore::new(test_dir("cache_hit"));
        let gatherer = FakeGatherer::new(vec![]);
        let chat = FakeChat::replying(&model_reply());
        let config = test_config();

        // First run fills the cache with today's date.
        let first = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        let gathers = gatherer.calls.load(Ordering::SeqCst);
        let chats = chat.calls.load(Ordering::SeqCst);

        let second = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        assert_eq!(second, first);
        assert_eq!(gatherer.calls.load(Ordering::SeqCst), gathers);
        assert_eq!(chat.calls.load(Ordering::SeqCst), chats);
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_stale_cache() {
        let dir = test_dir("stale");
        let stale = normalize_cards(
            &Value::Null,
            &Category::BRIEFING_ORDER,
            "2025-08-11T08:00:00Z",
            "https://news.google.com",
        );
        seed_stale_cards(&dir, stale.clone());
        let store = CacheStore::new(dir);

        let gatherer = FakeGatherer::new(vec![]);
        let chat = FakeChat::failing("model down");
        // Hour 0 makes the day-old entry stale at any local time.
        let mut config = test_config();
        config.refresh_hour = 0;

        let cards = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        assert_eq!(cards, stale);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_cache_is_empty() {
        let store = CacheStore::new(test_dir("no_fallback"));
        let gatherer = FakeGatherer::new(vec![]);
        let chat = FakeChat::failing("model down");
        let config = test_config();

        let cards = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unparseable_reply_normalizes_to_placeholders() {
        let store = CacheStore::new(test_dir("garbage_reply"));
        let gatherer = FakeGatherer::new(vec![item("World leaders meet", Category::Top)]);
        let chat = FakeChat::replying("I cannot produce JSON today, sorry.");
        let config = test_config();

        let cards = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        assert_eq!(cards.len(), 6);
        assert!(cards.iter().all(|c| c.headline == "Briefing unavailable"));
    }

    #[tokio::test]
    async fn test_search_mode_skips_gathering() {
        let store = CacheStore::new(test_dir("search_mode"));
        let gatherer = FakeGatherer::new(vec![item("Unused", Category::Top)]);
        let chat = FakeChat::replying(&model_reply());
        let mut config = test_config();
        config.mode = SourceMode::Search;

        let cards = fetch_daily_cards(&store, &gatherer, &chat, &config).await;
        assert_eq!(cards.len(), 6);
        assert_eq!(gatherer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sources_prompt_groups_by_category_in_order() {
        let items = vec![
            item("Tech story", Category::Tech),
            item("Top story", Category::Top),
        ];
        let prompt = sources_prompt(&items, 6);
        let top = prompt.find("TOP (pick 1):").unwrap();
        let tech = prompt.find("TECH (pick 1):").unwrap();
        let weather = prompt.find("WEATHER (pick 1):").unwrap();
        assert!(top < tech && tech < weather);
        assert!(prompt.contains("Top story"));
        assert!(prompt.contains("exactly 6 cards"));
    }

    #[test]
    fn test_sources_prompt_with_no_items_degrades_to_empty_array() {
        assert_eq!(sources_prompt(&[], 6), "[]");
    }

    #[test]
    fn test_sources_prompt_caps_items_per_category() {
        let items: Vec<SourceItem> = (0..10)
            .map(|i| item(&format!("Tech story {i}"), Category::Tech))
            .collect();
        let prompt = sources_prompt(&items, 3);
        assert!(prompt.contains("Tech story 2"));
        assert!(!prompt.contains("Tech story 3"));
    }
}
