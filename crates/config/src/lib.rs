//! Configuration management for the confab voice backend
//!
//! Settings come from the process environment (the deployment surface is a
//! container with provider keys injected as env vars). The system prompt is
//! composed from two text files on disk.

pub mod prompt;
pub mod settings;

pub use prompt::{load_system_prompt, DEFAULT_SYSTEM_PROMPT};
pub use settings::{load_settings, EngineKind, Settings, TtsProvider};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    ReadError(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required setting: {0}")]
    MissingKey(&'static str),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
