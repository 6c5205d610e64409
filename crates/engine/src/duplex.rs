//! Native-audio duplex engine (Gemini Live)
//!
//! One bidirectional socket handles STT, the model and TTS internally, so
//! the engine degenerates to a relay: client PCM goes up as base64 media
//! chunks, model audio and text come back down as `audio` /
//! `response_chunk` messages. The local-VAD barge-in gate is the same one
//! the full pipeline uses; server-side interruption is left to the
//! provider's own activity detection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use confab_config::Settings;
use confab_core::{
    decode_pcm16, frame_rms, ClientMessage, ClientSink, Error, Result, ServerMessage,
};
use confab_pipeline::VadGate;

use crate::ConversationEngine;

const OUTGOING_CHANNEL_CAPACITY: usize = 64;

/// Duplex session configuration
#[derive(Debug, Clone)]
pub struct DuplexConfig {
    pub api_key: String,
    /// Socket endpoint, overridable for tests
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
}

impl DuplexConfig {
    pub fn new(api_key: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: "wss://generativelanguage.googleapis.com/ws/\
                       google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
                .to_string(),
            model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Puck".to_string(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Native-audio duplex relay engine
pub struct DuplexEngine {
    config: DuplexConfig,
    inner: Mutex<Option<Arc<DuplexInner>>>,
}

impl DuplexEngine {
    pub fn new(config: DuplexConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings, system_prompt: &str) -> Result<Self> {
        let api_key = settings
            .require_duplex_key()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self::new(DuplexConfig::new(api_key, system_prompt)))
    }
}

#[async_trait]
impl ConversationEngine for DuplexEngine {
    async fn start(&self, sink: ClientSink) -> Result<()> {
        let mut slot = self.inner.lock().await;
        if slot.is_some() {
            tracing::debug!("duplex engine already started");
            return Ok(());
        }

        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connect("gemini_live", e))?;
        let (mut write, read) = socket.split();

        write
            .send(Message::Text(setup_message(&self.config).to_string()))
            .await
            .map_err(|e| Error::connect("gemini_live", e))?;
        tracing::info!(model = %self.config.model, "duplex session connected");

        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_CHANNEL_CAPACITY);
        let inner = Arc::new(DuplexInner {
            sink,
            outgoing,
            responding: AtomicBool::new(false),
            turn_seq: AtomicU64::new(0),
            vad: parking_lot::Mutex::new(VadGate::default()),
            session: CancellationToken::new(),
        });

        // Writer: relays queued frames until the session is cancelled.
        let session = inner.session.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = session.cancelled() => break,
                    frame = outgoing_rx.recv() => frame,
                };
                let Some(frame) = frame else { break };
                if let Err(e) = write.send(Message::Text(frame)).await {
                    tracing::debug!(error = %e, "duplex write failed, stopping writer");
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        tokio::spawn(relay_loop(inner.clone(), read));
        *slot = Some(inner);
        Ok(())
    }

    async fn on_audio(&self, frame: &[u8]) {
        let inner = self.inner.lock().await.clone();
        if let Some(inner) = inner {
            inner.handle_audio(frame).await;
        }
    }

    async fn on_text(&self, _message: ClientMessage) {
        tracing::debug!("duplex engine ignores client text frames");
    }

    async fn stop(&self) {
        let inner = self.inner.lock().await.take();
        let Some(inner) = inner else { return };
        inner.session.cancel();
        tracing::info!("duplex engine stopped");
    }

    fn name(&self) -> &'static str {
        "gemini_live"
    }
}

struct DuplexInner {
    sink: ClientSink,
    outgoing: mpsc::Sender<String>,
    responding: AtomicBool,
    turn_seq: AtomicU64,
    vad: parking_lot::Mutex<VadGate>,
    session: CancellationToken,
}

impl DuplexInner {
    async fn handle_audio(&self, frame: &[u8]) {
        match decode_pcm16(frame) {
            Ok(samples) => {
                let rms = frame_rms(&samples);
                if self.responding.load(Ordering::SeqCst) {
                    let fired = self.vad.lock().observe(rms);
                    if fired {
                        tracing::info!(
                            rms = rms as u32,
                            "barge-in: local vad during duplex response"
                        );
                        metrics::counter!("confab_barge_ins_total", "source" => "duplex_vad")
                            .increment(1);
                        self.turn_seq.fetch_add(1, Ordering::SeqCst);
                        self.sink.send(ServerMessage::StopAudio).await;
                    }
                } else {
                    self.vad.lock().reset();
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed audio frame");
                return;
            }
        }

        if self.outgoing.try_send(realtime_input(frame)).is_err() {
            tracing::debug!("dropping audio frame for duplex service");
        }
    }

    async fn handle_server_message(&self, raw: &str) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            tracing::debug!("ignoring unparseable duplex frame");
            return;
        };

        if value.get("setupComplete").is_some() {
            tracing::info!("duplex setup complete");
            return;
        }

        let Some(content) = value.get("serverContent") else {
            return;
        };

        if let Some(model_turn) = content.get("modelTurn") {
            // A fresh model turn allocates the id its audio will carry.
            if !self.responding.swap(true, Ordering::SeqCst) {
                self.turn_seq.fetch_add(1, Ordering::SeqCst);
            }
            let turn_id = self.turn_seq.load(Ordering::SeqCst);

            if let Some(parts) = model_turn.get("parts").and_then(|p| p.as_array()) {
                for part in parts {
                    if let Some(data) = part.pointer("/inlineData/data").and_then(|v| v.as_str()) {
                        self.sink
                            .send(ServerMessage::Audio {
                                data: data.to_string(),
                                turn_id,
                            })
                            .await;
                    } else if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                        self.sink
                            .send(ServerMessage::ResponseChunk {
                                content: text.to_string(),
                            })
                            .await;
                    }
                }
            }
        }

        if content.get("turnComplete").and_then(|v| v.as_bool()) == Some(true) {
            self.responding.store(false, Ordering::SeqCst);
            self.vad.lock().reset();
            self.sink.send(ServerMessage::TurnComplete).await;
        }
    }
}

async fn relay_loop(
    inner: Arc<DuplexInner>,
    mut read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
) {
    loop {
        let msg = tokio::select! {
            _ = inner.session.cancelled() => break,
            msg = read.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => inner.handle_server_message(&text).await,
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "duplex service closed the stream");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "duplex read failed");
                break;
            }
            None => break,
        }
    }
    tracing::info!("duplex relay ended");
}

fn setup_message(config: &DuplexConfig) -> serde_json::Value {
    serde_json::json!({
        "setup": {
            "model": config.model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": config.voice }
                    }
                }
            },
            "realtimeInputConfig": {
                "automaticActivityDetection": {}
            },
            "inputAudioTranscription": {},
            "systemInstruction": {
                "parts": [{ "text": format!("Please converse in English. {}", config.system_prompt) }]
            }
        }
    })
}

fn realtime_input(frame: &[u8]) -> String {
    serde_json::json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": "audio/pcm;rate=16000",
                "data": BASE64.encode(frame),
            }]
        }
    })
    .to_string()
}
