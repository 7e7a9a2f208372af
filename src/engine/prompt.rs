// Llama Chat Engine — Prompt Builder
// Derives the text sent to the completion endpoint from the conversation
// history. Only the most recent turn is sent: the hosted variant is
// fine-tuned to continue from a single marked prompt, not a transcript.

use crate::atoms::constants::PROMPT_MARKER;
use crate::engine::types::Turn;

/// Build the prompt for the next completion request.
///
/// If the latest turn is user-authored it is prefixed with the prompt
/// marker (plus a single space) so the reconciler can later find where the
/// model's echo of the prompt ends. Any other latest turn is sent verbatim.
/// An empty history yields an empty prompt; callers are expected to submit
/// only after appending the user's turn.
pub fn build_prompt(history: &[Turn]) -> String {
    match history.last() {
        Some(turn) if turn.is_user => format!("{} {}", PROMPT_MARKER, turn.text),
        Some(turn) => turn.text.clone(),
        None => String::new(),
    }
}
