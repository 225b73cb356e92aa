//! Chat-completion collaborator with exponential backoff retry logic.
//!
//! The curation step talks to an OpenAI-compatible `/chat/completions`
//! endpoint. The module uses a trait-based design so orchestrators and
//! tests never depend on the HTTP client directly:
//!
//! - [`ChatAsync`]: core trait defining the async chat interaction
//! - [`ChatClient`]: reqwest-backed client for the hosted endpoint
//! - [`RetryChat`]: decorator that adds retry logic to any [`ChatAsync`]
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// A two-part prompt for the summarization model.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    /// The system message establishing the curation contract.
    pub system: String,
    /// The user message carrying source material or search instructions.
    pub user: String,
}

/// Trait for async chat-completion interaction.
///
/// Implementors send a prompt to a model and return its text response.
/// The abstraction keeps retry decoration and test fakes interchangeable
/// with the real HTTP client.
pub trait ChatAsync {
    /// Send a prompt and receive the model's text response.
    async fn chat(&self, prompt: &ChatPrompt) -> Result<String, FetchError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatRequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// The API key is resolved from the environment at construction but only
/// required at call time, so a missing key flows through the orchestrator's
/// normal failure handling instead of aborting startup.
#[derive(Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    /// Build a client from configuration, with a per-request timeout.
    pub fn new(config: &ApiConfig, timeout: StdDuration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.is_empty()),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl ChatAsync for ChatClient {
    #[instrument(level = "info", skip_all)]
    async fn chat(&self, prompt: &ChatPrompt) -> Result<String, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::MissingApiKey(self.api_key_env.clone()))?;
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatRequestMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let t0 = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = truncate_for_log(&response.text().await.unwrap_or_default(), 300);
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u128,
                "chat completion returned an error status"
            );
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                FetchError::Parse("chat completion contained no message content".to_string())
            })?;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u128,
            bytes = content.len(),
            "chat completion received"
        );
        Ok(content)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`ChatAsync`].
///
/// Transparently retries transient failures (rate limits, network issues,
/// temporary server errors) before giving up and returning the last error.
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryChat<'a, T> {
    /// The underlying chat client to wrap.
    inner: &'a T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<'a, T> RetryChat<'a, T>
where
    T: ChatAsync,
{
    /// Wrap an existing client with retry behavior.
    ///
    /// # Arguments
    ///
    /// * `inner` - the client to wrap
    /// * `max_retries` - retry attempts after the first failure (5 recommended)
    /// * `base_delay` - initial delay between retries (1 second recommended)
    pub fn new(inner: &'a T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryChat<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryChat")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> ChatAsync for RetryChat<'_, T>
where
    T: ChatAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn chat(&self, prompt: &ChatPrompt) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.chat(prompt).await {
                Ok(response) => {
                    return Ok(response);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "chat() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "chat() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Wrap a client in the standard retry policy.
///
/// This is the wiring-time entry point for model calls: up to 5 retries,
/// exponential backoff 1s/2s/4s/8s/16s capped at 30s, jitter on every
/// delay. Orchestrators receive the wrapped client and stay unaware of
/// the policy.
pub fn with_default_backoff<T: ChatAsync>(client: &T) -> RetryChat<'_, T> {
    RetryChat::new(client, 5, StdDuration::from_secs(1))
}
