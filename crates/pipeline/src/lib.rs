//! Streaming STT/TTS adapters and audio utilities
//!
//! This crate holds the leaves of the voice pipeline:
//! - Deepgram live recognizer (duplex socket, ordered event stream)
//! - ElevenLabs streaming and Kokoro request-response synthesizers
//! - Sentence boundary splitting for LLM token streams
//! - Output rebuffering and the local VAD gate

pub mod sentence;
pub mod stt;
pub mod tts;
pub mod vad;

pub use sentence::SentenceSplitter;
pub use stt::{DeepgramConfig, DeepgramRecognizer};
pub use tts::{
    AudioRebuffer, ElevenLabsConfig, ElevenLabsTts, KokoroConfig, KokoroTts,
    MIN_AUDIO_CHUNK_BYTES,
};
pub use vad::VadGate;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<PipelineError> for confab_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Stt(msg) => confab_core::Error::stream_drop("stt", msg),
            PipelineError::Tts(msg) => confab_core::Error::Provider(msg),
            PipelineError::Configuration(msg) => confab_core::Error::Config(msg),
        }
    }
}
