//! Streaming LLM client
//!
//! Talks to an OpenAI-compatible chat-completions endpoint, owns the
//! per-session conversation history and runs tool-call rounds internally so
//! callers only ever see a stream of content fragments.

pub mod accumulate;
pub mod client;
pub mod sse;
pub mod types;

pub use accumulate::ToolCallAccumulator;
pub use client::{ChatClient, LlmConfig};
pub use sse::SseDecoder;
pub use types::{ChatMessage, FunctionCall, Role, ToolCallPayload};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for confab_core::Error {
    fn from(err: LlmError) -> Self {
        confab_core::Error::Provider(err.to_string())
    }
}
