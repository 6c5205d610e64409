//! Text-to-speech streamers
//!
//! Both providers present the same lazy chunk stream of PCM 24 kHz 16-bit
//! mono, whether the upstream is a streaming HTTP body (ElevenLabs) or a
//! single request-response (Kokoro). Errors end the stream with an empty
//! tail so the consuming turn can terminate cleanly.

pub mod elevenlabs;
pub mod kokoro;

pub use elevenlabs::{ElevenLabsConfig, ElevenLabsTts};
pub use kokoro::{KokoroConfig, KokoroTts};

/// Target size of outbound audio envelopes (~85 ms of 24 kHz PCM16 mono)
pub const MIN_AUDIO_CHUNK_BYTES: usize = 4096;

/// Byte accumulator between the TTS stream and the client channel.
///
/// Flushes once the buffer reaches the target size; the sentence tail may be
/// smaller.
#[derive(Debug)]
pub struct AudioRebuffer {
    target: usize,
    buffer: Vec<u8>,
}

impl AudioRebuffer {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            buffer: Vec::with_capacity(target),
        }
    }

    /// Add a chunk; returns the accumulated frame once it reaches the
    /// target size.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        (self.buffer.len() >= self.target).then(|| std::mem::take(&mut self.buffer))
    }

    /// Drain whatever remains at end of stream.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        (!self.buffer.is_empty()).then(|| std::mem::take(&mut self.buffer))
    }
}

impl Default for AudioRebuffer {
    fn default() -> Self {
        Self::new(MIN_AUDIO_CHUNK_BYTES)
    }
}
