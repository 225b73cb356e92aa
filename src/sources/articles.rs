//! Article API gatherer.
//!
//! Pulls headlines from a NewsAPI-compatible service instead of raw RSS.
//! Broad categories map onto the `/top-headlines` endpoint; the narrower
//! ones go through `/everything` with a search query scoped to the last
//! day. Responses are JSON and individual malformed articles are skipped.

use crate::config::ArticleApiConfig;
use crate::error::FetchError;
use crate::models::{Category, SourceItem};
use crate::sources::GatherItems;
use crate::utils::{strip_html, truncate_for_log};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::{info, instrument, warn};

/// Articles requested per category.
const PAGE_SIZE: usize = 5;

enum CategoryRequest {
    /// A stock `/top-headlines` category name.
    Headlines(&'static str),
    /// A free-text `/everything` query.
    Query(&'static str),
}

fn plan_for(category: Category) -> CategoryRequest {
    match category {
        Category::Top => CategoryRequest::Headlines("general"),
        Category::Sports => CategoryRequest::Headlines("sports"),
        Category::Org => CategoryRequest::Headlines("business"),
        Category::Tech => CategoryRequest::Query("technology AND (AI OR software OR chips)"),
        Category::Markets => CategoryRequest::Query("stock market OR economy OR earnings"),
        Category::Local => CategoryRequest::Query("local community OR city council"),
        Category::Weather => CategoryRequest::Query("weather forecast OR storm warning"),
    }
}

/// Build the request URL for one category.
fn request_url(base_url: &str, category: Category, now: DateTime<Utc>) -> String {
    let base = base_url.trim_end_matches('/');
    match plan_for(category) {
        CategoryRequest::Headlines(name) => format!(
            "{base}/top-headlines?category={name}&language=en&pageSize={PAGE_SIZE}"
        ),
        CategoryRequest::Query(query) => {
            let from = (now - Duration::days(1)).format("%Y-%m-%d");
            format!(
                "{base}/everything?q={}&from={from}&sortBy=publishedAt&language=en&pageSize={PAGE_SIZE}",
                urlencoding::encode(query)
            )
        }
    }
}

/// Gatherer backed by a NewsAPI-compatible article endpoint.
#[derive(Debug)]
pub struct ArticleApiGatherer {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl ArticleApiGatherer {
    /// Build a gatherer from config, resolving the API key from the
    /// configured environment variable.
    pub fn new(config: &ArticleApiConfig, timeout: StdDuration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("daily_briefing/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: config.api_key_env.clone(),
        }
    }
}

impl GatherItems for ArticleApiGatherer {
    #[instrument(level = "info", skip_all, fields(category = %category))]
    async fn items(&self, category: Category) -> Result<Vec<SourceItem>, FetchError> {
        let Some(api_key) = &self.api_key else {
            return Err(FetchError::MissingApiKey(self.api_key_env.clone()));
        };

        let url = request_url(&self.base_url, category, Utc::now());
        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: truncate_for_log(&body, 300),
            });
        }

        let body: Value = response.json().await?;
        if body.get("status").and_then(Value::as_str) != Some("ok") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("article API reported an error")
                .to_string();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let items = map_articles(&body, category);
        info!(count = items.len(), "gathered articles");
        Ok(items)
    }
}

/// Convert an article API response body into source items.
///
/// Articles missing a title or URL are dropped with a log line rather
/// than failing the whole response.
fn map_articles(body: &Value, category: Category) -> Vec<SourceItem> {
    let Some(articles) = body.get("articles").and_then(Value::as_array) else {
        return Vec::new();
    };

    articles
        .iter()
        .filter_map(|article| {
            let title = article
                .get("title")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty());
            let url = article
                .get("url")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|u| !u.is_empty());
            let (Some(title), Some(url)) = (title, url) else {
                warn!("article missing title or url; skipping");
                return None;
            };
            let source = article
                .get("source")
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            let published_at = article
                .get("publishedAt")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let summary = article
                .get("description")
                .and_then(Value::as_str)
                .map(strip_html)
                .filter(|d| !d.is_empty());
            Some(SourceItem {
                title: title.to_string(),
                url: url.to_string(),
                source,
                category,
                published_at,
                summary,
            })
        })
        .collect()
}
