//! Server-sent-events decoding
//!
//! Minimal line-oriented decoder for `text/event-stream` bodies: buffers
//! network chunks, emits the payload of each `data:` line. Multi-byte
//! characters can straddle chunk boundaries, so the buffer is kept as bytes
//! and decoded per line.

/// Incremental SSE `data:` line decoder
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk, returning any completed `data:` payloads.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_payload_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let payloads = decoder.push(b":1}\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: one\r\n\r\ndata: two\r\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"event: ping\n: comment\ndata: x\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_done_marker_passes_through() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: [DONE]\n\n");
        assert_eq!(payloads, vec!["[DONE]"]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let text = "data: caf\u{e9}\n".as_bytes();
        // Split in the middle of the two-byte é sequence
        let split = text.len() - 2;
        assert!(decoder.push(&text[..split]).is_empty());
        let payloads = decoder.push(&text[split..]);
        assert_eq!(payloads, vec!["caf\u{e9}"]);
    }
}
