//! Typed error values for the collaborator clients and orchestrators.
//!
//! Collaborator clients (feeds, article API, chat completions, quotes)
//! return [`FetchError`]; the orchestrators absorb those per call and log
//! them. The single hard failure the pipeline can surface is
//! [`MarketDataUnavailable`], raised only when live quotes and the cache
//! are both exhausted.

use thiserror::Error;

/// An error from an outbound collaborator call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The response arrived but did not contain what was asked for.
    #[error("could not parse response: {0}")]
    Parse(String),

    /// A required API key was not present in the environment.
    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(String),
}

/// Terminal failure of the market orchestrator.
///
/// Returned when every symbol's quote failed and no cached tickers exist.
/// Callers are expected to substitute default ticker rows.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no market data available: live quotes and cached data are both unavailable")]
pub struct MarketDataUnavailable;
