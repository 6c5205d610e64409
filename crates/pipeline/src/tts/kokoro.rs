//! Kokoro synchronous synthesizer
//!
//! Kokoro answers with the full PCM body in one response; the adapter still
//! presents the lazy chunk-stream interface, yielding the body as a single
//! chunk.

use tokio::sync::mpsc;

use confab_core::SpeechSynthesizer;

use crate::PipelineError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Kokoro configuration
#[derive(Debug, Clone)]
pub struct KokoroConfig {
    pub base_url: String,
    pub voice: String,
}

impl KokoroConfig {
    pub fn new(base_url: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            voice: voice.into(),
        }
    }
}

/// Request-response synthesizer returning PCM 24 kHz 16-bit mono
pub struct KokoroTts {
    http: reqwest::Client,
    config: KokoroConfig,
}

impl KokoroTts {
    pub fn new(config: KokoroConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        Ok(Self { http, config })
    }
}

impl SpeechSynthesizer for KokoroTts {
    fn stream(&self, text: &str) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(1);
        let http = self.http.clone();
        let config = self.config.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            let url = format!("{}/v1/audio/speech", config.base_url.trim_end_matches('/'));
            let response = http
                .post(url)
                .json(&serde_json::json!({
                    "model": "kokoro",
                    "input": text,
                    "voice": config.voice,
                    "response_format": "pcm",
                }))
                .send()
                .await;

            let response = match response {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::warn!(status = %r.status(), "kokoro request rejected");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "kokoro request failed");
                    return;
                }
            };

            match response.bytes().await {
                Ok(audio) if !audio.is_empty() => {
                    tracing::debug!(bytes = audio.len(), "kokoro synthesis complete");
                    let _ = tx.send(audio.to_vec()).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "kokoro body read failed");
                }
            }
        });

        rx
    }

    fn name(&self) -> &'static str {
        "kokoro"
    }
}
