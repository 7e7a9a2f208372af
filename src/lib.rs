// Llama Chat Engine — streaming chat over a hosted Llama 2 completion endpoint
//
// The engine behind a chat view: it keeps the conversation history, builds
// the prompt for each exchange, streams partial completion text from the
// hosted endpoint, and splits the model's echoed prompt from its actual
// reply using the `[PROMPT]` marker convention. The view (message list,
// settings panel, auto-scroll) is a separate collaborator that drains the
// engine's event channel.

pub mod atoms;
pub mod engine;

pub use atoms::constants::PROMPT_MARKER;
pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{ChunkReceiver, CompletionProvider, ProviderError};
pub use engine::chat::ChatEngine;
pub use engine::prompt::build_prompt;
pub use engine::providers::{AnyProvider, ReplicateConfig, ReplicateProvider};
pub use engine::reconcile::reconcile;
pub use engine::sessions::ChatSession;
pub use engine::types::{EngineEvent, InferenceSettings, ModelVariant, Turn};
