//! Core traits and types for the confab voice backend
//!
//! This crate provides the foundational types used across all other crates:
//! - Client wire messages (JSON frames on the duplex channel)
//! - Provider trait seams (recognizer, response generator, synthesizer)
//! - PCM audio helpers
//! - Error types

pub mod audio;
pub mod error;
pub mod message;
pub mod sink;
pub mod traits;

pub use audio::{decode_pcm16, frame_rms};
pub use error::{Error, Result};
pub use message::{ClientMessage, EngineState, ServerMessage, SttEvent, TurnId};
pub use sink::ClientSink;
pub use traits::{Recognizer, RecognizerHandle, ResponseGenerator, SpeechSynthesizer};
