// ── Atoms: Error Types ─────────────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain and limited to what the engine
//     actually produces — transport detail stays in `ProviderError`.
//   • No variant carries secret material (API tokens) in its message.

use thiserror::Error;

use crate::atoms::traits::ProviderError;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Completion provider HTTP or API-level failure.
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Engine configuration is invalid (bad settings values, bad base URL).
    #[error("Configuration error: {0}")]
    Config(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a provider error with name and message.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Generic attribution for provider failures that arrive without a
/// provider name. Call sites that know the backend use
/// `EngineError::provider` instead.
impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        EngineError::Provider { provider: "completion".into(), message: e.to_string() }
    }
}

/// Shorthand result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;
