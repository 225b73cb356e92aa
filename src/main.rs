//! # Daily Briefing
//!
//! A daily briefing generator that gathers news headlines (RSS feeds, a
//! news-article API, or model-side web search), curates them into six
//! category cards through an OpenAI-compatible LLM, pulls a ticker strip
//! from a quotes API, caches both against a daily refresh hour, and
//! writes one JSON artifact per day for a dashboard frontend.
//!
//! ## Features
//!
//! - Six-card briefing (top, tech, sports, markets, local, weather),
//!   exactly one card per category regardless of what the model returns
//! - Three source modes: RSS feeds, news-article API, model web search
//! - Ticker strip via GLOBAL_QUOTE lookups with per-symbol failure
//!   isolation
//! - File-backed cache keyed on a local refresh hour; stale data beats
//!   no data when collaborators fail
//!
//! ## Usage
//!
//! ```sh
//! daily_briefing -o ./briefings
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Gather**: collect per-category source items (mode-dependent)
//! 2. **Curate**: one model call demanding exactly six cards
//! 3. **Normalize**: force whatever came back into the fixed card shape
//! 4. **Market**: quote the configured symbols concurrently
//! 5. **Output**: write `{output_dir}/{date}.json`

use chrono::{Local, Utc};
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod error;
mod llm;
mod market;
mod models;
mod news;
mod normalize;
mod output;
mod sources;
mod utils;

use cache::CacheStore;
use cli::Cli;
use config::SourceMode;
use llm::{ChatClient, with_default_backoff};
use market::{HttpQuoteClient, MARKET_CACHE_KEY};
use models::Briefing;
use news::NEWS_CACHE_KEY;
use sources::articles::ArticleApiGatherer;
use sources::feeds::RssGatherer;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("daily_briefing starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.output_dir, ?args.config, "Parsed CLI arguments");

    // ---- Config ----
    let mut config = config::load(args.config.as_deref())?;
    if let Some(hour) = args.refresh_hour {
        info!(hour, "Overriding refresh hour from CLI");
        config.news.refresh_hour = hour;
        config.market.refresh_hour = hour;
    }
    config::validate(&config)?;

    let store = CacheStore::new(config.cache.dir.clone());

    // ---- Cache maintenance switches ----
    if args.cache_info {
        let news_info = store.info(NEWS_CACHE_KEY, config.news.refresh_hour);
        let market_info = store.info(MARKET_CACHE_KEY, config.market.refresh_hour);
        info!(key = NEWS_CACHE_KEY, ?news_info, "Cache status");
        info!(key = MARKET_CACHE_KEY, ?market_info, "Cache status");
        return Ok(());
    }
    if args.clear_cache {
        info!("Clearing both cache entries before fetch");
        store.clear(NEWS_CACHE_KEY);
        store.clear(MARKET_CACHE_KEY);
    }

    // Early check: ensure the output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let timeout = Duration::from_secs(config.http.timeout_secs);

    // ---- News ----
    let chat_client = ChatClient::new(&config.api, timeout);
    let chat = with_default_backoff(&chat_client);
    let cards = match config.news.mode {
        SourceMode::Articles => {
            let gatherer = ArticleApiGatherer::new(&config.news.article_api, timeout);
            news::fetch_daily_cards(&store, &gatherer, &chat, &config.news).await
        }
        SourceMode::Feeds | SourceMode::Search => {
            let gatherer = RssGatherer::new(config.news.feeds.clone(), timeout);
            news::fetch_daily_cards(&store, &gatherer, &chat, &config.news).await
        }
    };

    // ---- Market ----
    let quote_client = HttpQuoteClient::new(&config.market, timeout);
    let tickers = match market::fetch_market_data(&store, &quote_client, &config.market).await {
        Ok(tickers) => tickers,
        Err(e) => {
            warn!(error = %e, "Market data unavailable; rendering placeholder tickers");
            market::default_tickers(&config.market.symbols)
        }
    };

    // ---- Assemble and write ----
    let briefing = Briefing {
        local_date: Local::now().date_naive().to_string(),
        local_time: Local::now().time().format("%H:%M:%S").to_string(),
        generated_at: Utc::now().to_rfc3339(),
        cards,
        tickers,
    };
    info!(
        date = %briefing.local_date,
        cards = briefing.cards.len(),
        tickers = briefing.tickers.len(),
        "Briefing assembled"
    );

    let path = output::write_briefing(&briefing, &args.output_dir).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        path = %path,
        "Execution complete"
    );

    Ok(())
}
