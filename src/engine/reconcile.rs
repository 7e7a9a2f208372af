// Llama Chat Engine — Stream Reconciler
// The completion stream interleaves the model's echo of the submitted
// prompt with its actual reply. This module splits the two on the prompt
// marker so the view only ever shows genuine assistant text.

use crate::atoms::constants::PROMPT_MARKER;

/// Extract the assistant-visible text from the raw completion buffer.
///
/// Everything after the first occurrence of the prompt marker, trimmed, is
/// the reply-in-progress. A buffer with no marker yields `""`: the model
/// has not yet produced output past an echoed prompt boundary, so any text
/// before the marker is suppressed. That suppression is intentional and
/// matches the hosted variant's output shape.
///
/// Pure and idempotent; re-run on every chunk as the buffer grows.
/// Known limitation: the marker appearing inside genuine model output is a
/// false positive and is not corrected.
pub fn reconcile(buffer: &str) -> &str {
    match buffer.find(PROMPT_MARKER) {
        Some(i) => buffer[i + PROMPT_MARKER.len()..].trim(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_after_marker_is_returned_trimmed() {
        assert_eq!(
            reconcile("[PROMPT] echoed prompt here is my answer"),
            "echoed prompt here is my answer"
        );
        assert_eq!(reconcile("[PROMPT]   padded   "), "padded");
    }

    #[test]
    fn test_no_marker_yields_empty() {
        assert_eq!(reconcile("the model rambling before any echo"), "");
        assert_eq!(reconcile(""), "");
    }

    #[test]
    fn test_marker_alone_yields_empty() {
        assert_eq!(reconcile("[PROMPT]"), "");
        assert_eq!(reconcile("[PROMPT]   "), "");
    }

    #[test]
    fn test_grows_with_buffer() {
        // Simulates the buffer growing across streamed chunks.
        let mut buffer = String::new();
        let mut last_len = 0;
        for chunk in ["[PROMPT]", " Tell me a joke", " Why did", " the llama cross"] {
            buffer.push_str(chunk);
            let display = reconcile(&buffer);
            assert!(display.len() >= last_len, "display text must grow monotonically");
            last_len = display.len();
        }
        assert_eq!(reconcile(&buffer), "Tell me a joke Why did the llama cross");
    }

    #[test]
    fn test_idempotent() {
        let buffer = "[PROMPT] hello there";
        assert_eq!(reconcile(buffer), reconcile(buffer));
    }

    #[test]
    fn test_splits_on_first_marker() {
        // A second marker in genuine output stays in the display text.
        assert_eq!(
            reconcile("[PROMPT] q [PROMPT] still part of the answer"),
            "q [PROMPT] still part of the answer"
        );
    }
}
