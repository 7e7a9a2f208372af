// Llama Chat Engine — Hosted Completion Provider
// Streams text completions from the Replicate-backed Llama 2 endpoint.
// All HTTP retry/classification logic for that endpoint lives here; the
// response body is a plain stream of UTF-8 text chunks (the endpoint's
// framing), forwarded as received.

use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info, warn};
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::atoms::constants::COMPLETION_PATH;
use crate::atoms::traits::{ChunkReceiver, CompletionProvider, ProviderError};
use crate::engine::http::{is_retryable_status, parse_retry_after, retry_delay, CircuitBreaker, MAX_RETRIES};
use crate::engine::types::{CompletionRequest, InferenceSettings};

/// Circuit breaker shared across all requests to the hosted endpoint.
static REPLICATE_CIRCUIT: LazyLock<CircuitBreaker> = LazyLock::new(|| CircuitBreaker::new(5, 60));

// ── Config ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// Origin of the hosted completion API, e.g. "https://chat.example.com".
    pub base_url: String,
    /// Optional bearer token; the public endpoint needs none.
    pub api_token: Option<String>,
}

impl ReplicateConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ReplicateConfig { base_url: base_url.into(), api_token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

// ── Provider ───────────────────────────────────────────────────────────────

pub struct ReplicateProvider {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl ReplicateProvider {
    pub fn new(config: &ReplicateConfig) -> Self {
        ReplicateProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
        }
    }

    fn completion_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), COMPLETION_PATH)
    }

    /// Open the streaming request with full retry + error classification.
    /// Returns the live response once a 2xx arrives; retries happen only
    /// before any stream content has been consumed.
    async fn open_stream(
        &self,
        body: &CompletionRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = self.completion_url();
        info!("[engine] Completion request to {} version={}", url, body.version);

        // Fail fast while the circuit is open
        if let Err(msg) = REPLICATE_CIRCUIT.check() {
            return Err(ProviderError::Transport(msg));
        }

        let mut last_error = String::new();
        let mut last_status: u16 = 0;
        let mut retry_after: Option<u64> = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[engine] Completion retry {}/{} after {}ms",
                    attempt,
                    MAX_RETRIES,
                    delay.as_millis()
                );
            }

            let mut req = self
                .client
                .post(&url)
                .header("Content-Type", "application/json");
            if let Some(token) = &self.api_token {
                req = req.bearer_auth(token);
            }

            let response = match req.json(body).send().await {
                Ok(r) => r,
                Err(e) => {
                    REPLICATE_CIRCUIT.record_failure();
                    last_error = format!("HTTP request failed: {}", e);
                    last_status = 0;
                    if attempt < MAX_RETRIES {
                        continue;
                    }
                    return Err(ProviderError::Transport(last_error));
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                last_status = status;
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                last_error = format!("API error {}: {}", status, truncate(&body_text, 200));
                error!("[engine] Completion error {}: {}", status, truncate(&body_text, 500));

                REPLICATE_CIRCUIT.record_failure();

                // Auth errors are never retried
                if status == 401 || status == 403 {
                    return Err(ProviderError::Auth(last_error));
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    continue;
                }
                return if status == 429 {
                    Err(ProviderError::RateLimited {
                        message: last_error,
                        retry_after_secs: retry_after.take(),
                    })
                } else {
                    Err(ProviderError::Api { status, message: last_error })
                };
            }

            REPLICATE_CIRCUIT.record_success();
            return Ok(response);
        }

        // All retries exhausted — classify the last error
        match last_status {
            0 => Err(ProviderError::Transport(last_error)),
            429 => Err(ProviderError::RateLimited {
                message: last_error,
                retry_after_secs: retry_after,
            }),
            s => Err(ProviderError::Api { status: s, message: last_error }),
        }
    }
}

#[async_trait]
impl CompletionProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn stream_completion(
        &self,
        prompt: &str,
        settings: &InferenceSettings,
    ) -> Result<ChunkReceiver, ProviderError> {
        let body = CompletionRequest::new(prompt, settings);
        let response = self.open_stream(&body).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            while let Some(result) = byte_stream.next().await {
                match result {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if text.is_empty() {
                            continue;
                        }
                        if tx.send(Ok(text)).is_err() {
                            // Receiver dropped: the exchange was superseded.
                            return;
                        }
                    }
                    Err(e) => {
                        error!("[engine] Stream read error: {}", e);
                        let _ = tx.send(Err(ProviderError::Transport(format!(
                            "Stream read error: {}",
                            e
                        ))));
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Truncate on a char boundary for error messages.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_url_joins_without_double_slash() {
        let provider = ReplicateProvider::new(&ReplicateConfig::new("https://chat.example.com/"));
        assert_eq!(provider.completion_url(), "https://chat.example.com/api");

        let provider = ReplicateProvider::new(&ReplicateConfig::new("https://chat.example.com"));
        assert_eq!(provider.completion_url(), "https://chat.example.com/api");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("hi", 10), "hi");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[test]
    fn test_config_builder() {
        let config = ReplicateConfig::new("https://x.test").with_token("tok");
        assert_eq!(config.base_url, "https://x.test");
        assert_eq!(config.api_token.as_deref(), Some("tok"));
    }
}
