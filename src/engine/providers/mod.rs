// Llama Chat Engine — Completion providers
// Concrete backends for the `CompletionProvider` trait, plus the
// type-erased `AnyProvider` wrapper. Adding a backend means implementing
// the trait in a new module here — the exchange logic never changes.

pub mod replicate;

pub use replicate::{ReplicateConfig, ReplicateProvider};

use async_trait::async_trait;

use crate::atoms::traits::{ChunkReceiver, CompletionProvider, ProviderError};
use crate::engine::types::InferenceSettings;

/// Type-erased completion provider. Callers hold `AnyProvider` and call
/// `.stream_completion()` without knowing which concrete backend is in use.
pub struct AnyProvider(Box<dyn CompletionProvider>);

impl AnyProvider {
    /// Construct the concrete provider for a config. The hosted Replicate
    /// endpoint is the only backend today; a backend with a different wire
    /// format gets its own module and a constructor arm here.
    pub fn from_config(config: &ReplicateConfig) -> Self {
        AnyProvider(Box::new(ReplicateProvider::new(config)))
    }
}

#[async_trait]
impl CompletionProvider for AnyProvider {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn stream_completion(
        &self,
        prompt: &str,
        settings: &InferenceSettings,
    ) -> Result<ChunkReceiver, ProviderError> {
        self.0.stream_completion(prompt, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_builds_hosted_provider() {
        let provider = AnyProvider::from_config(&ReplicateConfig::new("https://chat.example.com"));
        assert_eq!(provider.name(), "replicate");
    }
}
