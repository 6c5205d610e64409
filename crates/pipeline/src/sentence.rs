//! Sentence boundary splitting for LLM token streams
//!
//! Buffers streamed fragments and emits complete sentences as soon as a
//! terminator (`.`, `!`, `?`) followed by whitespace is seen. The trailing
//! residual stays buffered until the stream ends.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("sentence boundary regex"));

/// Streaming sentence splitter
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return any now-complete sentences, terminator
    /// included, whitespace consumed.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let mut sentences = Vec::new();
        let mut consumed = 0;
        for boundary in SENTENCE_BOUNDARY.find_iter(&self.buffer) {
            // The terminator is a single ASCII byte; keep it, drop the
            // whitespace run.
            let end = boundary.start() + 1;
            let sentence = self.buffer[consumed..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            consumed = boundary.end();
        }
        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        sentences
    }

    /// Drain the residual at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        let rest = self.buffer.trim().to_string();
        self.buffer.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_each_terminator() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("One. Two! Three? Four");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
        assert_eq!(splitter.flush().as_deref(), Some("Four"));
    }

    #[test]
    fn test_terminator_without_whitespace_is_retained() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("It's 3:14 PM.").is_empty());
        assert_eq!(splitter.flush().as_deref(), Some("It's 3:14 PM."));
    }

    #[test]
    fn test_decimals_do_not_split() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("Pi is 3.14159 roughly. Next");
        assert_eq!(sentences, vec!["Pi is 3.14159 roughly."]);
        assert_eq!(splitter.flush().as_deref(), Some("Next"));
    }

    #[test]
    fn test_boundary_across_fragments() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("Hello there").is_empty());
        assert!(splitter.push(".").is_empty());
        let sentences = splitter.push(" How are you? ");
        assert_eq!(sentences, vec!["Hello there.", "How are you?"]);
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn test_whitespace_run_is_consumed() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("Done.\n\n  Next up. ");
        assert_eq!(sentences, vec!["Done.", "Next up."]);
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn test_flush_empty_buffer() {
        let mut splitter = SentenceSplitter::new();
        assert_eq!(splitter.flush(), None);
        splitter.push("   ");
        assert_eq!(splitter.flush(), None);
    }
}
