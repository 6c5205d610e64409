//! Engine selection
//!
//! The engine is chosen by configuration at session start. A pipeline
//! selection with missing provider keys falls back to the duplex variant
//! rather than refusing the session.

use std::sync::Arc;

use confab_config::{EngineKind, Settings};
use confab_core::Result;

use crate::duplex::DuplexEngine;
use crate::pipeline::PipelineEngine;
use crate::ConversationEngine;

/// Build the engine for a new session.
pub fn create_engine(
    settings: &Settings,
    system_prompt: &str,
) -> Result<Arc<dyn ConversationEngine>> {
    if settings.conversation_engine == EngineKind::DeepgramPipeline {
        match PipelineEngine::from_settings(settings, system_prompt) {
            Ok(engine) => {
                tracing::info!("session engine: deepgram pipeline");
                return Ok(Arc::new(engine));
            }
            Err(e) => {
                tracing::warn!(error = %e, "pipeline engine unavailable, falling back to duplex");
            }
        }
    }

    let engine = DuplexEngine::from_settings(settings, system_prompt)?;
    tracing::info!("session engine: gemini live duplex");
    Ok(Arc::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_default_selects_duplex() {
        let mut settings = base_settings();
        settings.google_api_key = Some("g".to_string());

        let engine = create_engine(&settings, "prompt").unwrap();
        assert_eq!(engine.name(), "gemini_live");
    }

    #[test]
    fn test_pipeline_with_keys() {
        let mut settings = base_settings();
        settings.conversation_engine = EngineKind::DeepgramPipeline;
        settings.deepgram_api_key = Some("dg".to_string());
        settings.llm_api_key = Some("llm".to_string());
        settings.elevenlabs_api_key = Some("el".to_string());

        let engine = create_engine(&settings, "prompt").unwrap();
        assert_eq!(engine.name(), "deepgram_pipeline");
    }

    #[test]
    fn test_missing_pipeline_keys_fall_back_to_duplex() {
        let mut settings = base_settings();
        settings.conversation_engine = EngineKind::DeepgramPipeline;
        settings.deepgram_api_key = Some("dg".to_string());
        // No LLM key; duplex key present.
        settings.google_api_key = Some("g".to_string());

        let engine = create_engine(&settings, "prompt").unwrap();
        assert_eq!(engine.name(), "gemini_live");
    }

    #[test]
    fn test_no_keys_at_all_is_an_error() {
        let mut settings = base_settings();
        settings.conversation_engine = EngineKind::DeepgramPipeline;

        assert!(create_engine(&settings, "prompt").is_err());
    }
}
