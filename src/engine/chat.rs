// Llama Chat Engine — Exchange Orchestrator
// Drives one exchange end to end: commit the previous reply, append the
// user turn, build the prompt, stream the completion, and reconcile each
// chunk into display text. Emits engine events for the view to render.

use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ChunkReceiver, CompletionProvider};
use crate::engine::prompt::build_prompt;
use crate::engine::reconcile::reconcile;
use crate::engine::sessions::ChatSession;
use crate::engine::types::{EngineEvent, InferenceSettings, Turn};

/// Owns one chat session and the machinery to run exchanges against a
/// completion provider. All mutable state lives here — no ambient globals.
///
/// One streaming exchange is logically in flight at a time: a new
/// submission supersedes an active stream, and the superseded stream's
/// remaining chunks are discarded via the generation counter.
pub struct ChatEngine {
    session: Arc<Mutex<ChatSession>>,
    settings: Mutex<InferenceSettings>,
    provider: Arc<dyn CompletionProvider>,
    events: UnboundedSender<EngineEvent>,
    generation: Arc<AtomicU64>,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        events: UnboundedSender<EngineEvent>,
    ) -> Self {
        ChatEngine {
            session: Arc::new(Mutex::new(ChatSession::new())),
            settings: Mutex::new(InferenceSettings::default()),
            provider,
            events,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn session_id(&self) -> String {
        self.session.lock().id().to_string()
    }

    /// Snapshot of the committed history.
    pub fn history(&self) -> Vec<Turn> {
        self.session.lock().history().to_vec()
    }

    /// The in-progress (not yet committed) assistant text.
    pub fn pending_display(&self) -> String {
        self.session.lock().pending_display().to_string()
    }

    pub fn settings(&self) -> InferenceSettings {
        self.settings.lock().clone()
    }

    /// Commit new settings from the settings panel. Validation happens
    /// here so NaN or out-of-range values never reach a request body.
    pub fn update_settings(&self, settings: InferenceSettings) -> EngineResult<()> {
        settings.validate()?;
        info!(
            "[engine] Settings updated: variant={} temp={} topP={} maxTokens={}",
            settings.variant.shortened(),
            settings.temperature,
            settings.top_p,
            settings.max_tokens
        );
        *self.settings.lock() = settings;
        Ok(())
    }

    /// Run one exchange for `user_text`.
    ///
    /// Commits any pending assistant reply from the prior exchange, appends
    /// the user turn, and starts streaming. Returns the run id, or `None`
    /// for an empty submission (a no-op). Failures during streaming arrive
    /// as `EngineEvent::Error`; they leave history and display text as they
    /// were, and the user may simply submit again.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, user_text: &str) -> EngineResult<Option<String>> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            warn!("[engine] Ignoring empty submission");
            return Ok(None);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let (session_id, prompt, generation) = {
            let mut session = self.session.lock();
            if session.commit_pending() {
                info!("[engine] Committed pending assistant reply into history");
            }
            session.push_user(user_text);
            // Bump the generation while still holding the session lock:
            // exchange tasks re-check it under the same lock, so an
            // in-flight stream can never write a stale display between
            // the commit above and the bump.
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (session.id().to_string(), build_prompt(session.history()), generation)
        };
        let settings = self.settings.lock().clone();

        info!(
            "[engine] Exchange start session={} run={} gen={} prompt_len={}",
            session_id,
            run_id,
            generation,
            prompt.len()
        );

        let provider = Arc::clone(&self.provider);
        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        let generations = Arc::clone(&self.generation);
        let run = run_id.clone();
        tokio::spawn(async move {
            run_exchange(
                provider,
                session,
                events,
                generations,
                generation,
                session_id,
                run,
                prompt,
                settings,
            )
            .await;
        });

        Ok(Some(run_id))
    }
}

/// Drive a single streaming exchange to completion.
///
/// The stream buffer lives here for the lifetime of the request — it is
/// reset implicitly because each exchange gets a fresh one. Every accepted
/// chunk re-runs the reconciler over the whole buffer and publishes the
/// result as the session's pending display text.
async fn run_exchange(
    provider: Arc<dyn CompletionProvider>,
    session: Arc<Mutex<ChatSession>>,
    events: UnboundedSender<EngineEvent>,
    generations: Arc<AtomicU64>,
    generation: u64,
    session_id: String,
    run_id: String,
    prompt: String,
    settings: InferenceSettings,
) {
    let mut rx: ChunkReceiver = match provider.stream_completion(&prompt, &settings).await {
        Ok(rx) => rx,
        Err(e) => {
            if generations.load(Ordering::SeqCst) != generation {
                return; // superseded while connecting
            }
            let err = EngineError::provider(provider.name(), e.to_string());
            error!("[engine] Completion request failed run={}: {}", run_id, err);
            let _ = events.send(EngineEvent::Error {
                session_id,
                run_id,
                message: err.to_string(),
            });
            return;
        }
    };

    let mut buffer = String::new();
    while let Some(item) = rx.recv().await {
        match item {
            Ok(chunk) => {
                buffer.push_str(&chunk);
                let display = reconcile(&buffer).to_string();
                if !apply_display(
                    &session,
                    &events,
                    &generations,
                    generation,
                    &session_id,
                    &run_id,
                    display,
                ) {
                    info!("[engine] Discarding stale chunk run={} gen={}", run_id, generation);
                    return;
                }
            }
            Err(e) => {
                if generations.load(Ordering::SeqCst) != generation {
                    return;
                }
                let err = EngineError::provider(provider.name(), e.to_string());
                error!("[engine] Streaming error run={}: {}", run_id, err);
                let _ = events.send(EngineEvent::Error {
                    session_id,
                    run_id,
                    message: err.to_string(),
                });
                return;
            }
        }
    }

    finish_exchange(&session, &events, &generations, generation, &session_id, &run_id);
}

/// Publish a reconciled display for an exchange, unless it has been
/// superseded. The generation is re-checked under the session lock — a
/// newer submission bumps it while holding the same lock, so the check
/// and the write are atomic with respect to supersession.
fn apply_display(
    session: &Mutex<ChatSession>,
    events: &UnboundedSender<EngineEvent>,
    generations: &AtomicU64,
    generation: u64,
    session_id: &str,
    run_id: &str,
    display: String,
) -> bool {
    let mut session = session.lock();
    if generations.load(Ordering::SeqCst) != generation {
        return false;
    }
    session.set_pending_display(display.clone());
    let _ = events.send(EngineEvent::Delta {
        session_id: session_id.to_string(),
        run_id: run_id.to_string(),
        text: display,
    });
    true
}

/// Emit the terminal `Complete` for an exchange, unless it has been
/// superseded. Same locking discipline as `apply_display`.
fn finish_exchange(
    session: &Mutex<ChatSession>,
    events: &UnboundedSender<EngineEvent>,
    generations: &AtomicU64,
    generation: u64,
    session_id: &str,
    run_id: &str,
) -> bool {
    let session = session.lock();
    if generations.load(Ordering::SeqCst) != generation {
        return false;
    }
    let final_text = session.pending_display().to_string();
    info!(
        "[engine] Exchange complete run={} final_len={}",
        run_id,
        final_text.len()
    );
    let _ = events.send(EngineEvent::Complete {
        session_id: session_id.to_string(),
        run_id: run_id.to_string(),
        text: final_text,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::{CompletionProvider, ProviderError};
    use async_trait::async_trait;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    /// Provider whose streams are fed by the test: each call to
    /// `stream_completion` opens a channel and parks its sender for the
    /// test to push chunks through.
    struct ManualProvider {
        senders: Mutex<Vec<mpsc::UnboundedSender<Result<String, ProviderError>>>>,
    }

    impl ManualProvider {
        fn new() -> Arc<Self> {
            Arc::new(ManualProvider { senders: Mutex::new(Vec::new()) })
        }

        /// Wait for the engine's spawned task to open stream number `call`,
        /// then hand back its sender.
        async fn sender(&self, call: usize) -> mpsc::UnboundedSender<Result<String, ProviderError>> {
            loop {
                if let Some(tx) = self.senders.lock().get(call) {
                    return tx.clone();
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        }

        /// Close the stream for the given call, ending it normally.
        fn close(&self, call: usize) {
            let mut senders = self.senders.lock();
            drop(senders.remove(call));
            senders.insert(call, mpsc::unbounded_channel().0); // keep indices stable
        }
    }

    #[async_trait]
    impl CompletionProvider for ManualProvider {
        fn name(&self) -> &str {
            "manual"
        }

        async fn stream_completion(
            &self,
            _prompt: &str,
            _settings: &InferenceSettings,
        ) -> Result<ChunkReceiver, ProviderError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().push(tx);
            Ok(rx)
        }
    }

    /// Provider that always fails to open a stream.
    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn stream_completion(
            &self,
            _prompt: &str,
            _settings: &InferenceSettings,
        ) -> Result<ChunkReceiver, ProviderError> {
            Err(ProviderError::Api { status: 502, message: "bad gateway".into() })
        }
    }

    fn engine_with(
        provider: Arc<dyn CompletionProvider>,
    ) -> (ChatEngine, UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChatEngine::new(provider, tx), rx)
    }

    async fn next_delta(rx: &mut UnboundedReceiver<EngineEvent>) -> (String, String) {
        match rx.recv().await.expect("event channel closed") {
            EngineEvent::Delta { run_id, text, .. } => (run_id, text),
            other => panic!("expected Delta, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streamed_exchange_reconciles_each_chunk() {
        let provider = ManualProvider::new();
        let (engine, mut events) = engine_with(provider.clone());

        let run = engine.submit("Tell me a joke").unwrap().expect("run id");
        let tx = provider.sender(0).await;

        tx.send(Ok("[PROMPT]".into())).unwrap();
        let (rid, text) = next_delta(&mut events).await;
        assert_eq!(rid, run);
        assert_eq!(text, "");
        assert_eq!(engine.pending_display(), "");

        tx.send(Ok(" Tell me a joke".into())).unwrap();
        let (_, text) = next_delta(&mut events).await;
        assert_eq!(text, "Tell me a joke");

        tx.send(Ok(" Why did the llama...".into())).unwrap();
        let (_, text) = next_delta(&mut events).await;
        assert_eq!(text, "Tell me a joke Why did the llama...");
        assert_eq!(engine.pending_display(), "Tell me a joke Why did the llama...");

        // Only the user's turn is committed while the reply streams.
        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_user);
        assert_eq!(history[0].text, "Tell me a joke");

        // Stream end emits Complete with the final display text.
        drop(tx);
        provider.close(0);
        match events.recv().await.unwrap() {
            EngineEvent::Complete { run_id, text, .. } => {
                assert_eq!(run_id, run);
                assert_eq!(text, "Tell me a joke Why did the llama...");
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_submission_commits_previous_reply() {
        let provider = ManualProvider::new();
        let (engine, mut events) = engine_with(provider.clone());

        engine.submit("first question").unwrap();
        let tx = provider.sender(0).await;
        tx.send(Ok("[PROMPT] first question and an answer".into())).unwrap();
        next_delta(&mut events).await;
        drop(tx);
        provider.close(0);
        assert!(matches!(events.recv().await.unwrap(), EngineEvent::Complete { .. }));

        assert_eq!(engine.history().len(), 1);

        engine.submit("second question").unwrap();

        // The prior display text became an assistant turn, then the new
        // user turn was appended: +2 across the two submissions.
        let history = engine.history();
        assert_eq!(history.len(), 3);
        assert!(history[0].is_user);
        assert!(!history[1].is_user);
        assert_eq!(history[1].text, "first question and an answer");
        assert!(history[2].is_user);
        assert_eq!(history[2].text, "second question");
        assert_eq!(engine.pending_display(), "");
    }

    #[tokio::test]
    async fn test_superseding_submission_discards_stale_chunks() {
        let provider = ManualProvider::new();
        let (engine, mut events) = engine_with(provider.clone());

        let run1 = engine.submit("one").unwrap().unwrap();
        let tx1 = provider.sender(0).await;
        tx1.send(Ok("[PROMPT] one a".into())).unwrap();
        let (rid, _) = next_delta(&mut events).await;
        assert_eq!(rid, run1);

        let run2 = engine.submit("two").unwrap().unwrap();
        let tx2 = provider.sender(1).await;

        // A late chunk from the superseded stream must produce no event
        // and must not touch the display text.
        tx1.send(Ok(" stale tail".into())).unwrap();
        tx2.send(Ok("[PROMPT] two b".into())).unwrap();

        let (rid, text) = next_delta(&mut events).await;
        assert_eq!(rid, run2);
        assert_eq!(text, "two b");
        assert_eq!(engine.pending_display(), "two b");
    }

    #[test]
    fn test_superseded_generation_never_writes_or_emits() {
        let session = Arc::new(Mutex::new(ChatSession::new()));
        session.lock().set_pending_display("current".into());
        let (tx, mut rx) = mpsc::unbounded_channel();
        // A newer submission has already moved the counter past 1.
        let generations = AtomicU64::new(2);

        assert!(!apply_display(&session, &tx, &generations, 1, "s", "r1", "stale".into()));
        assert_eq!(session.lock().pending_display(), "current");
        assert!(rx.try_recv().is_err());

        assert!(!finish_exchange(&session, &tx, &generations, 1, "s", "r1"));
        assert!(rx.try_recv().is_err());

        // The live generation still goes through.
        assert!(apply_display(&session, &tx, &generations, 2, "s", "r2", "fresh".into()));
        assert_eq!(session.lock().pending_display(), "fresh");
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Delta { .. }));
        assert!(finish_exchange(&session, &tx, &generations, 2, "s", "r2"));
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn test_request_failure_emits_error_and_preserves_state() {
        let (engine, mut events) = engine_with(Arc::new(FailingProvider));

        engine.submit("hello").unwrap();
        match events.recv().await.unwrap() {
            EngineEvent::Error { message, .. } => {
                assert!(message.contains("502"));
            }
            other => panic!("expected Error, got {:?}", other),
        }

        // The user's turn stays (they can retry); nothing else changed.
        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_user);
        assert_eq!(engine.pending_display(), "");
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_display() {
        let provider = ManualProvider::new();
        let (engine, mut events) = engine_with(provider.clone());

        engine.submit("hello").unwrap();
        let tx = provider.sender(0).await;
        tx.send(Ok("[PROMPT] hello par".into())).unwrap();
        next_delta(&mut events).await;

        tx.send(Err(ProviderError::Transport("connection reset".into()))).unwrap();
        match events.recv().await.unwrap() {
            EngineEvent::Error { message, .. } => assert!(message.contains("connection reset")),
            other => panic!("expected Error, got {:?}", other),
        }
        // Whatever was displayed before the failure is still there.
        assert_eq!(engine.pending_display(), "hello par");
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_submission_is_a_noop() {
        let provider = ManualProvider::new();
        let (engine, _events) = engine_with(provider.clone());

        assert!(engine.submit("").unwrap().is_none());
        assert!(engine.submit("   ").unwrap().is_none());
        assert!(engine.history().is_empty());
        assert!(provider.senders.lock().is_empty());
    }

    #[tokio::test]
    async fn test_update_settings_validates() {
        let provider = ManualProvider::new();
        let (engine, _events) = engine_with(provider);

        let bad = InferenceSettings { temperature: f64::NAN, ..Default::default() };
        assert!(engine.update_settings(bad).is_err());
        // Rejected settings leave the current snapshot untouched.
        assert_eq!(engine.settings().temperature, 0.75);

        let good = InferenceSettings { temperature: 0.2, ..Default::default() };
        engine.update_settings(good).unwrap();
        assert_eq!(engine.settings().temperature, 0.2);
    }
}
