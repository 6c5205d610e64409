//! System prompt composition
//!
//! The prompt is split across two files: a persona document and a rules
//! document, concatenated at session-manager start. A missing file falls
//! back to a generic assistant prompt rather than refusing to boot.

use std::fs;
use std::io;

use crate::settings::Settings;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant.";

/// Compose the system prompt from the configured files.
pub fn load_system_prompt(settings: &Settings) -> String {
    match compose(&settings.soul_path, &settings.rules_path) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!(
                soul = %settings.soul_path,
                rules = %settings.rules_path,
                error = %e,
                "failed to load system prompt files, using fallback"
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

fn compose(soul_path: &str, rules_path: &str) -> io::Result<String> {
    let soul = fs::read_to_string(soul_path)?;
    let rules = fs::read_to_string(rules_path)?;
    Ok(format!("{soul}\n\n{rules}"))
}
