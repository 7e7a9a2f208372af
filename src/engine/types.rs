// Llama Chat Engine — Core types
// The data structures that flow through the engine. They are independent
// of the transport and of any view layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};

// ── Turns ──────────────────────────────────────────────────────────────

/// One message in the conversation. Immutable once appended to history;
/// insertion order is conversation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub text: String,
    pub is_user: bool,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn { text: text.into(), is_user: true, created_at: Utc::now() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn { text: text.into(), is_user: false, created_at: Utc::now() }
    }
}

// ── Model variant ──────────────────────────────────────────────────────

/// Which hosted model version a request targets. The endpoint currently
/// serves one Llama 2 variant; `Custom` carries an arbitrary version id
/// for endpoints that add more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Prompter,
    Custom { version: String },
}

impl ModelVariant {
    /// The immutable model-version hash sent on the wire.
    pub fn version_id(&self) -> &str {
        match self {
            ModelVariant::Prompter => LLAMA2_PROMPTER_VERSION,
            ModelVariant::Custom { version } => version,
        }
    }

    /// Human-readable name for logs and the settings panel.
    pub fn display_name(&self) -> &str {
        match self {
            ModelVariant::Prompter => LLAMA2_PROMPTER_NAME,
            ModelVariant::Custom { .. } => "custom",
        }
    }

    pub fn shortened(&self) -> &str {
        match self {
            ModelVariant::Prompter => LLAMA2_PROMPTER_SHORT,
            ModelVariant::Custom { .. } => "custom",
        }
    }
}

impl Default for ModelVariant {
    fn default() -> Self {
        ModelVariant::Prompter
    }
}

// ── Inference settings ─────────────────────────────────────────────────

/// User-adjustable sampling parameters, read once per exchange when the
/// request is built. Mutated only through `ChatEngine::update_settings`,
/// which validates before accepting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub variant: ModelVariant,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        InferenceSettings {
            variant: ModelVariant::default(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl InferenceSettings {
    /// Reject values that must never reach the request body: non-finite
    /// floats (a non-numeric settings field parses to NaN upstream) and
    /// out-of-range sampling parameters.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(EngineError::config(format!(
                "temperature must be a number in [0, 1], got {}",
                self.temperature
            )));
        }
        if !self.top_p.is_finite() || !(0.0..=1.0).contains(&self.top_p) {
            return Err(EngineError::config(format!(
                "topP must be a number in [0, 1], got {}",
                self.top_p
            )));
        }
        if self.max_tokens == 0 {
            return Err(EngineError::config("maxTokens must be a positive integer"));
        }
        if let ModelVariant::Custom { version } = &self.variant {
            if version.is_empty() {
                return Err(EngineError::config("custom model version must not be empty"));
            }
        }
        Ok(())
    }
}

// ── Wire request body ──────────────────────────────────────────────────

/// JSON body POSTed to the completion endpoint. Field names are the
/// endpoint's camelCase convention — keep in sync with the hosted API.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest<'a> {
    pub version: &'a str,
    pub temperature: f64,
    #[serde(rename = "topP")]
    pub top_p: f64,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    pub prompt: &'a str,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(prompt: &'a str, settings: &'a InferenceSettings) -> Self {
        CompletionRequest {
            version: settings.variant.version_id(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
            prompt,
        }
    }
}

// ── Streaming events (engine → view) ───────────────────────────────────

/// Events the engine emits while an exchange runs. `text` on `Delta` is
/// the full reconciled display text, not an increment — the view replaces
/// its in-progress assistant message with it and auto-scrolls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineEvent {
    /// The in-progress assistant text changed.
    #[serde(rename = "delta")]
    Delta {
        session_id: String,
        run_id: String,
        text: String,
    },
    /// The stream ended; `text` is the final display text for this exchange.
    #[serde(rename = "complete")]
    Complete {
        session_id: String,
        run_id: String,
        text: String,
    },
    /// The exchange failed. History and display text are unchanged; the
    /// user may retry by submitting again.
    #[serde(rename = "error")]
    Error {
        session_id: String,
        run_id: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = InferenceSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.temperature, 0.75);
        assert_eq!(settings.top_p, 0.9);
        assert_eq!(settings.max_tokens, 100);
        assert_eq!(settings.variant, ModelVariant::Prompter);
    }

    #[test]
    fn test_validate_rejects_nan_temperature() {
        let settings = InferenceSettings { temperature: f64::NAN, ..Default::default() };
        assert!(matches!(settings.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let settings = InferenceSettings { top_p: 1.5, ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = InferenceSettings { temperature: -0.1, ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = InferenceSettings { max_tokens: 0, ..Default::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_request_body_uses_endpoint_field_names() {
        let settings = InferenceSettings::default();
        let body = CompletionRequest::new("[PROMPT] hi", &settings);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["version"], LLAMA2_PROMPTER_VERSION);
        assert_eq!(json["temperature"], 0.75);
        assert_eq!(json["topP"], 0.9);
        assert_eq!(json["maxTokens"], 100);
        assert_eq!(json["prompt"], "[PROMPT] hi");
    }

    #[test]
    fn test_custom_variant_version_id() {
        let variant = ModelVariant::Custom { version: "abc123".into() };
        assert_eq!(variant.version_id(), "abc123");
        assert_eq!(ModelVariant::Prompter.version_id(), LLAMA2_PROMPTER_VERSION);
    }
}
