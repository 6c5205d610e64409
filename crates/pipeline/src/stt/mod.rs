//! Streaming speech-to-text adapters

pub mod deepgram;

pub use deepgram::{DeepgramConfig, DeepgramRecognizer};
