//! Runtime configuration.
//!
//! Everything has a default: running with no config file at all produces
//! a working feeds-mode setup. A YAML file overrides only the fields it
//! names (every level is `#[serde(default)]`), so a two-line file tuning
//! one refresh hour is valid. Secrets never live in the file; each
//! external service names the environment variable its key is read from.

use crate::sources::feeds::{FeedSpec, default_feeds};
use serde::Deserialize;
use std::error::Error;
use tracing::info;

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub news: NewsConfig,
    pub market: MarketConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
}

/// Chat-completion endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Where the briefing's source material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Parse the configured RSS feeds.
    #[default]
    Feeds,
    /// Query a news-article API.
    Articles,
    /// Skip gathering; the model searches the web itself.
    Search,
}

/// News pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub mode: SourceMode,
    /// Local hour (0-23) after which yesterday's briefing is stale.
    pub refresh_hour: u32,
    /// URL used in synthesized citations when a card has none.
    pub fallback_url: String,
    /// Items per category included in the curation prompt.
    pub max_items_per_category: usize,
    pub feeds: Vec<FeedSpec>,
    pub article_api: ArticleApiConfig,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Feeds,
            refresh_hour: 8,
            fallback_url: "https://news.google.com".to_string(),
            max_items_per_category: 6,
            feeds: default_feeds(),
            article_api: ArticleApiConfig::default(),
        }
    }
}

/// Article API (NewsAPI-compatible) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArticleApiConfig {
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ArticleApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".to_string(),
            api_key_env: "NEWSAPI_KEY".to_string(),
        }
    }
}

/// Market data settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Local hour (0-23) after which yesterday's tickers are stale.
    pub refresh_hour: u32,
    pub symbols: Vec<String>,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            refresh_hour: 8,
            symbols: ["SPY", "QQQ", "AAPL", "MSFT", "GOOGL", "TSLA", "NVDA", "META"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            base_url: "https://www.alphavantage.co/query".to_string(),
            api_key_env: "ALPHA_VANTAGE_API_KEY".to_string(),
        }
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// Cache store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: ".briefing-cache".to_string(),
        }
    }
}

/// Load configuration from a YAML file, or defaults when no path given.
///
/// A path that cannot be read or parsed is an error; the caller asked
/// for that specific file.
pub fn load(path: Option<&str>) -> Result<AppConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&raw)?;
            info!(path, "loaded configuration file");
            Ok(config)
        }
        None => Ok(AppConfig::default()),
    }
}

/// Reject configurations that cannot produce a briefing at all.
pub fn validate(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    if config.news.refresh_hour > 23 {
        return Err(format!(
            "news.refresh_hour must be 0-23, got {}",
            config.news.refresh_hour
        )
        .into());
    }
    if config.market.refresh_hour > 23 {
        return Err(format!(
            "market.refresh_hour must be 0-23, got {}",
            config.market.refresh_hour
        )
        .into());
    }
    if config.market.symbols.is_empty() {
        return Err("market.symbols must name at least one ticker".into());
    }
    Ok(())
}
