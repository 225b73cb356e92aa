//! Market data fetch.
//!
//! Resolves the configured ticker symbols against a GLOBAL_QUOTE endpoint
//! (Alpha Vantage wire format), a few symbols at a time. Symbols are
//! isolated from each other: one bad quote is skipped, not fatal. Results
//! land in the cache under [`MARKET_CACHE_KEY`] and a same-day run is
//! served from there without touching the network. Only when every symbol
//! fails and no cached snapshot survives does the fetch report
//! [`MarketDataUnavailable`], so the caller can decide what to render.

use crate::cache::CacheStore;
use crate::config::MarketConfig;
use crate::error::{FetchError, MarketDataUnavailable};
use crate::models::TickerItem;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Cache key for the ticker snapshot.
pub const MARKET_CACHE_KEY: &str = "daily-market-tickers";
/// Concurrent quote requests in flight.
const QUOTE_PARALLELISM: usize = 8;

/// One resolved quote, before it is decorated with a company name.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Source of per-symbol quotes.
///
/// The orchestrator is generic over this so tests can swap in a scripted
/// lookup instead of a live HTTP client.
pub trait QuoteLookup {
    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, FetchError>;
}

/// Quote client speaking the Alpha Vantage GLOBAL_QUOTE protocol.
#[derive(Debug)]
pub struct HttpQuoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl HttpQuoteClient {
    /// Build a client from config, resolving the API key from the
    /// configured environment variable.
    pub fn new(config: &MarketConfig, timeout: Duration) -> Self {
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

impl QuoteLookup for HttpQuoteClient {
    async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, FetchError> {
        let Some(api_key) = &self.api_key else {
            return Err(FetchError::MissingApiKey(self.api_key_env.clone()));
        };
        let url = format!(
            "{}?function=GLOBAL_QUOTE&symbol={}&apikey={api_key}",
            self.base_url,
            urlencoding::encode(symbol)
        );
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: format!("quote fetch failed for {symbol}"),
            });
        }
        let body: Value = response.json().await?;
        parse_global_quote(symbol, &body)
            .ok_or_else(|| FetchError::Parse(quote_failure_message(symbol, &body)))
    }
}

/// Map a GLOBAL_QUOTE response body onto a snapshot.
///
/// The endpoint returns every field as a string under numbered keys.
/// Missing or unparseable numbers fall back to `0.0`; a missing or empty
/// `"Global Quote"` object (the rate-limit shape) yields `None`.
fn parse_global_quote(symbol: &str, body: &Value) -> Option<QuoteSnapshot> {
    let quote = body.get("Global Quote")?.as_object()?;
    if quote.is_empty() {
        return None;
    }
    let resolved = quote
        .get("01. symbol")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(symbol);
    Some(QuoteSnapshot {
        symbol: resolved.to_string(),
        price: numeric_field(quote, "05. price"),
        change: numeric_field(quote, "09. change"),
        change_percent: numeric_field(quote, "10. change percent"),
    })
}

fn numeric_field(quote: &serde_json::Map<String, Value>, key: &str) -> f64 {
    match quote.get(key) {
        Some(Value::String(raw)) => raw.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        Some(value) => value.as_f64().unwrap_or(0.0),
        None => 0.0,
    }
}

/// Pull a human-readable reason out of a body that carried no quote.
/// Alpha Vantage signals throttling and bad keys through prose fields.
fn quote_failure_message(symbol: &str, body: &Value) -> String {
    for key in ["Note", "Information", "Error Message"] {
        if let Some(message) = body.get(key).and_then(Value::as_str) {
            return truncate_for_log(message, 200);
        }
    }
    format!("no usable quote for {symbol}")
}

/// Fetch ticker data, preferring cache, falling back to stale cache.
///
/// # Returns
///
/// The ticker list, or [`MarketDataUnavailable`] when every symbol failed
/// and nothing cached survives to serve instead.
#[instrument(level = "info", skip_all)]
pub async fn fetch_market_data<Q: QuoteLookup>(
    store: &CacheStore,
    quotes: &Q,
    config: &MarketConfig,
) -> Result<Vec<TickerItem>, MarketDataUnavailable> {
    // Snapshot before the policy read: a stale `get` deletes the entry,
    // and the all-symbols-failed path still wants yesterday's numbers.
    let fallback: Option<Vec<TickerItem>> = store.peek(MARKET_CACHE_KEY);
    if let Some(cached) = store.get::<Vec<TickerItem>>(MARKET_CACHE_KEY, config.refresh_hour) {
        info!(count = cached.len(), "serving cached market data");
        return Ok(cached);
    }

    let snapshots: Vec<Option<QuoteSnapshot>> = stream::iter(config.symbols.iter())
        .map(|symbol| async move {
            match quotes.quote(symbol).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "quote fetch failed; skipping symbol");
                    None
                }
            }
        })
        .buffered(QUOTE_PARALLELISM)
        .collect()
        .await;

    let fresh: Vec<TickerItem> = snapshots
        .into_iter()
        .flatten()
        .map(|snapshot| TickerItem {
            name: company_name(&snapshot.symbol).to_string(),
            symbol: snapshot.symbol,
            price: snapshot.price,
            change: snapshot.change,
            change_percent: snapshot.change_percent,
        })
        .collect();

    if fresh.is_empty() {
        if let Some(stale) = fallback.filter(|tickers| !tickers.is_empty()) {
            warn!(
                count = stale.len(),
                "every quote failed; serving stale market data"
            );
            return Ok(stale);
        }
        error!("every quote failed and no cached market data exists");
        return Err(MarketDataUnavailable);
    }

    info!(count = fresh.len(), "fetched fresh market data");
    store.set(MARKET_CACHE_KEY, &fresh, config.refresh_hour);
    Ok(fresh)
}

/// Display name for a ticker symbol. Unknown symbols display as themselves.
pub fn company_name(symbol: &str) -> &str {
    match symbol {
        "SPY" => "S&P 500 ETF",
        "QQQ" => "Nasdaq-100 ETF",
        "AAPL" => "Apple Inc.",
        "MSFT" => "Microsoft Corp.",
        "GOOGL" => "Alphabet Inc.",
        "TSLA" => "Tesla Inc.",
        "NVDA" => "NVIDIA Corp.",
        "META" => "Meta Platforms",
        _ => symbol,
    }
}

/// Zeroed placeholder rows for when no market data can be served at all.
pub fn default_tickers(symbols: &[String]) -> Vec<TickerItem> {
    symbols
        .iter()
        .map(|symbol| TickerItem {
            symbol: symbol.clone(),
            name: company_name(symbol).to_string(),
            price: 0.0,
            change: 0.0,
            change_percent: 0.0,
        })
        .collect()
}
