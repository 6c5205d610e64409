//! Error types shared across the backend

use thiserror::Error;

/// Backend errors
///
/// Variants map to the recovery policy applied by the engine:
/// `Connect` during session start is fatal, a `StreamDrop` on the STT side
/// ends event delivery for the session, LLM/TTS drops and `Provider` errors
/// end only the current turn, `Transcode` drops the offending frame.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to connect to {service}: {reason}")]
    Connect { service: &'static str, reason: String },

    #[error("{service} stream dropped: {reason}")]
    StreamDrop { service: &'static str, reason: String },

    #[error("malformed audio frame: {0}")]
    Transcode(String),

    #[error("tool '{name}' failed: {reason}")]
    Tool { name: String, reason: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Connect failure for a named remote service
    pub fn connect(service: &'static str, reason: impl ToString) -> Self {
        Self::Connect {
            service,
            reason: reason.to_string(),
        }
    }

    /// Mid-session stream drop for a named remote service
    pub fn stream_drop(service: &'static str, reason: impl ToString) -> Self {
        Self::StreamDrop {
            service,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
