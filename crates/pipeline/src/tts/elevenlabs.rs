//! ElevenLabs streaming synthesizer

use futures::StreamExt;
use tokio::sync::mpsc;

use confab_core::SpeechSynthesizer;

use crate::PipelineError;

const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// ElevenLabs configuration
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    /// API endpoint, overridable for tests
    pub endpoint: String,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model_id: "eleven_turbo_v2_5".to_string(),
            endpoint: "https://api.elevenlabs.io".to_string(),
        }
    }
}

/// Streaming synthesizer returning PCM 24 kHz 16-bit mono
pub struct ElevenLabsTts {
    http: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsTts {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        Ok(Self { http, config })
    }
}

impl SpeechSynthesizer for ElevenLabsTts {
    fn stream(&self, text: &str) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let http = self.http.clone();
        let config = self.config.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            let url = format!(
                "{}/v1/text-to-speech/{}/stream?output_format=pcm_24000",
                config.endpoint.trim_end_matches('/'),
                config.voice_id,
            );
            let response = http
                .post(url)
                .header("xi-api-key", &config.api_key)
                .json(&serde_json::json!({
                    "text": text,
                    "model_id": config.model_id,
                }))
                .send()
                .await;

            let response = match response {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::warn!(status = %r.status(), "elevenlabs request rejected");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "elevenlabs request failed");
                    return;
                }
            };

            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) if !bytes.is_empty() => {
                        if tx.send(bytes.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "elevenlabs stream ended early");
                        break;
                    }
                }
            }
        });

        rx
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_tts_server(status: u16, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the request before answering.
            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];
            loop {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                    let content_length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() - (pos + 4) >= content_length {
                        break;
                    }
                }
                let n = socket.read(&mut tmp).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);
            }

            let header = format!(
                "HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn collect(mut rx: mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
        let mut audio = Vec::new();
        while let Some(chunk) = rx.recv().await {
            audio.extend_from_slice(&chunk);
        }
        audio
    }

    #[tokio::test]
    async fn test_streams_pcm_body() {
        let pcm = vec![7u8; 9000];
        let endpoint = spawn_tts_server(200, pcm.clone()).await;

        let mut config = ElevenLabsConfig::new("key", "voice");
        config.endpoint = endpoint;
        let tts = ElevenLabsTts::new(config).unwrap();

        let audio = collect(tts.stream("Hello there.")).await;
        assert_eq!(audio, pcm);
    }

    #[tokio::test]
    async fn test_error_status_yields_empty_stream() {
        let endpoint = spawn_tts_server(402, Vec::new()).await;

        let mut config = ElevenLabsConfig::new("key", "voice");
        config.endpoint = endpoint;
        let tts = ElevenLabsTts::new(config).unwrap();

        let audio = collect(tts.stream("Hello there.")).await;
        assert!(audio.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_empty_stream() {
        let mut config = ElevenLabsConfig::new("key", "voice");
        config.endpoint = "http://127.0.0.1:1".to_string();
        let tts = ElevenLabsTts::new(config).unwrap();

        let audio = collect(tts.stream("Hello there.")).await;
        assert!(audio.is_empty());
    }
}
