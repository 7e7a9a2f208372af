// Llama Chat Engine — Session
// In-memory conversation state for one chat session: the append-only turn
// history plus the not-yet-committed assistant display text. Nothing is
// persisted — a session lives and dies with the process.

use chrono::{DateTime, Utc};
use log::info;

use crate::engine::types::Turn;

/// One conversation. History is append-only; the pending display text is
/// the assistant reply currently being streamed (or last streamed), which
/// is only promoted into history when the *next* user submission starts —
/// or never, if the session ends first.
pub struct ChatSession {
    id: String,
    created_at: DateTime<Utc>,
    history: Vec<Turn>,
    pending_display: String,
}

impl ChatSession {
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        info!("[engine] New chat session {}", id);
        ChatSession {
            id,
            created_at: Utc::now(),
            history: Vec::new(),
            pending_display: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The committed turns, in conversation order.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(Turn::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(Turn::assistant(text));
    }

    /// The in-progress assistant text derived from the current stream.
    pub fn pending_display(&self) -> &str {
        &self.pending_display
    }

    pub fn set_pending_display(&mut self, text: String) {
        self.pending_display = text;
    }

    /// Take the pending display text out of the session, leaving it empty.
    /// The caller decides what becomes of the text — committing it is
    /// `commit_pending`'s job.
    pub fn take_pending_display(&mut self) -> String {
        std::mem::take(&mut self.pending_display)
    }

    /// Promote a non-empty pending display text into a committed assistant
    /// turn and clear it. Returns whether anything was committed. Called at
    /// the start of the next exchange, never during streaming.
    pub fn commit_pending(&mut self) -> bool {
        if self.pending_display.is_empty() {
            return false;
        }
        let text = self.take_pending_display();
        self.history.push(Turn::assistant(text));
        true
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
