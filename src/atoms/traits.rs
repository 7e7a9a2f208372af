// ── Atoms: Provider Seam ───────────────────────────────────────────────────
// The golden trait every completion backend implements, plus the error
// classification providers report. The orchestrator only ever talks to
// `dyn CompletionProvider`, so a new backend (or a test double) never
// requires touching the exchange logic.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::engine::types::InferenceSettings;

// ── Provider errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Connection-level failure: DNS, TLS, socket, mid-stream read error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP response from the endpoint.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// 429 from the endpoint, with the server's requested backoff if given.
    #[error("Rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },

    /// 401/403 — never retried.
    #[error("Auth error: {0}")]
    Auth(String),
}

/// Incremental text chunks from one in-flight completion request.
/// The channel closes when the stream ends; an `Err` item is terminal.
pub type ChunkReceiver = UnboundedReceiver<Result<String, ProviderError>>;

// ── The trait ──────────────────────────────────────────────────────────────

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name for logging and error attribution.
    fn name(&self) -> &str;

    /// Open a streaming completion request for `prompt` with the given
    /// settings snapshot. Returns once the response stream is established;
    /// the text arrives incrementally on the receiver.
    async fn stream_completion(
        &self,
        prompt: &str,
        settings: &InferenceSettings,
    ) -> Result<ChunkReceiver, ProviderError>;
}
