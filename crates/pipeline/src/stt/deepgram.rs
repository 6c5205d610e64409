//! Deepgram live recognizer
//!
//! Duplex bridge to the Deepgram streaming API. The socket is split into a
//! command-driven writer (audio frames, application keepalives, close) and a
//! reader that maps the JSON events into `SttEvent`s in arrival order.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use confab_core::{Error, Recognizer, RecognizerHandle, Result, SttEvent};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Deepgram live configuration
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    /// Socket endpoint, overridable for tests
    pub endpoint: String,
    pub model: String,
    pub language: String,
}

impl DeepgramConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: "wss://api.deepgram.com".to_string(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
        }
    }

    /// Listen URL with the session parameters: linear PCM 16 kHz mono,
    /// interim results, server-side VAD events, 1000 ms utterance-end
    /// timeout, smart formatting.
    fn listen_url(&self) -> String {
        format!(
            "{}/v1/listen?model={}&language={}&smart_format=true&interim_results=true\
             &vad_events=true&utterance_end_ms=1000&encoding=linear16&sample_rate=16000&channels=1",
            self.endpoint.trim_end_matches('/'),
            self.model,
            self.language,
        )
    }
}

/// Deepgram live recognizer factory
pub struct DeepgramRecognizer {
    config: DeepgramConfig,
}

impl DeepgramRecognizer {
    pub fn new(config: DeepgramConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Recognizer for DeepgramRecognizer {
    async fn connect(&self) -> Result<(Box<dyn RecognizerHandle>, mpsc::Receiver<SttEvent>)> {
        let mut request = self
            .config
            .listen_url()
            .into_client_request()
            .map_err(|e| Error::connect("deepgram", e))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.config.api_key)
                .parse()
                .map_err(|_| Error::connect("deepgram", "invalid api key"))?,
        );

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| Error::connect("deepgram", e))?;
        tracing::info!(model = %self.config.model, "deepgram connected");

        let (mut write, mut read) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<SttCommand>(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Writer: serializes all outgoing traffic.
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let result = match cmd {
                    SttCommand::Audio(frame) => write.send(Message::Binary(frame)).await,
                    SttCommand::KeepAlive => {
                        write
                            .send(Message::Text(r#"{"type":"KeepAlive"}"#.to_string()))
                            .await
                    }
                    SttCommand::Close => {
                        let _ = write
                            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
                            .await;
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "recognizer write failed, stopping writer");
                    break;
                }
            }
        });

        // Reader: events in arrival order until the recognizer closes.
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_live_message(&text) {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "recognizer closed the stream");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx
                            .send(SttEvent::Error {
                                reason: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        Ok((Box::new(DeepgramHandle { cmd: cmd_tx }), event_rx))
    }
}

enum SttCommand {
    Audio(Vec<u8>),
    KeepAlive,
    Close,
}

struct DeepgramHandle {
    cmd: mpsc::Sender<SttCommand>,
}

#[async_trait]
impl RecognizerHandle for DeepgramHandle {
    async fn send_audio(&self, frame: &[u8]) {
        // Best-effort: a full queue or closed recognizer drops the frame.
        if let Err(e) = self.cmd.try_send(SttCommand::Audio(frame.to_vec())) {
            tracing::debug!(error = %e, "dropping audio frame for recognizer");
        }
    }

    async fn keepalive(&self) {
        let _ = self.cmd.send(SttCommand::KeepAlive).await;
    }

    async fn close(&self) {
        let _ = self.cmd.send(SttCommand::Close).await;
    }
}

#[derive(Deserialize)]
struct LiveMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    channel: Option<LiveChannel>,
    #[serde(default)]
    is_final: Option<bool>,
}

#[derive(Deserialize)]
struct LiveChannel {
    #[serde(default)]
    alternatives: Vec<LiveAlternative>,
}

#[derive(Deserialize)]
struct LiveAlternative {
    #[serde(default)]
    transcript: String,
}

fn parse_live_message(text: &str) -> Option<SttEvent> {
    let msg: LiveMessage = serde_json::from_str(text).ok()?;
    match msg.kind.as_deref()? {
        "Results" => {
            let transcript = msg.channel?.alternatives.into_iter().next()?.transcript;
            if transcript.is_empty() {
                return None;
            }
            Some(SttEvent::Transcript {
                text: transcript,
                is_final: msg.is_final.unwrap_or(false),
            })
        }
        "UtteranceEnd" => Some(SttEvent::UtteranceEnd),
        "SpeechStarted" => Some(SttEvent::SpeechStarted),
        _ => None,
    }
}
