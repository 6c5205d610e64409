//! Full-pipeline engine: STT -> LLM -> TTS
//!
//! One instance per session. An orchestrator task consumes recognizer
//! events and drives the turn state machine:
//!
//! - endpointing races the recognizer's `utterance_end` against a local
//!   silence timer re-armed on every final transcript;
//! - three barge-in detectors (local VAD, transcript text while speaking,
//!   `utterance_end` while speaking) all funnel through the same fire
//!   procedure: cancel the live turn, await its ack, bump the turn id, emit
//!   `stop_audio`;
//! - a dispatched turn runs as its own task that streams LLM fragments
//!   through the sentence splitter into the synthesizer, tagging every
//!   audio envelope with the turn id captured at dispatch.
//!
//! Cancellation is token-based and transitive: the session token parents
//! each turn token, which parents the turn's keepalive. Every write after a
//! suspension point re-checks the token or the current turn id.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use confab_config::{Settings, TtsProvider};
use confab_core::{
    decode_pcm16, frame_rms, ClientMessage, ClientSink, EngineState, Error, Recognizer,
    RecognizerHandle, ResponseGenerator, Result, ServerMessage, SpeechSynthesizer, SttEvent,
    TurnId,
};
use confab_llm::{ChatClient, LlmConfig};
use confab_pipeline::{
    AudioRebuffer, DeepgramConfig, DeepgramRecognizer, ElevenLabsConfig, ElevenLabsTts,
    KokoroConfig, KokoroTts, SentenceSplitter, VadGate,
};

use crate::ConversationEngine;

/// Local endpoint fallback when the recognizer misses an utterance end
const SILENCE_TIMEOUT: Duration = Duration::from_millis(1200);

/// Recognizer liveness ping interval during an agent turn
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Pause after the last sentence before `turn_complete`, so the mic does
/// not re-trigger on the tail of the playback
const TAIL_ECHO_GUARD: Duration = Duration::from_millis(500);

/// Output byte rate used for the soft-backpressure estimate
const OUTPUT_BYTES_PER_SEC: f64 = 48_000.0;

/// Full STT -> LLM -> TTS engine
pub struct PipelineEngine {
    recognizer: Arc<dyn Recognizer>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    inner: Mutex<Option<Arc<EngineInner>>>,
}

impl PipelineEngine {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            recognizer,
            generator,
            synthesizer,
            inner: Mutex::new(None),
        }
    }

    /// Build the engine from settings. Fails when a required provider key
    /// is missing, which the factory turns into a duplex fallback.
    pub fn from_settings(settings: &Settings, system_prompt: &str) -> Result<Self> {
        settings
            .require_pipeline_keys()
            .map_err(|e| Error::Config(e.to_string()))?;

        let deepgram_key = settings.deepgram_api_key.clone().unwrap_or_default();
        let recognizer = Arc::new(DeepgramRecognizer::new(DeepgramConfig::new(deepgram_key)));

        let generator = ChatClient::new(
            LlmConfig {
                base_url: settings.llm_base_url.clone(),
                api_key: settings.llm_api_key.clone().unwrap_or_default(),
                model: settings.llm_model.clone(),
            },
            Arc::new(confab_tools::default_registry()),
            system_prompt,
        )
        .map_err(Error::from)?;

        let synthesizer: Arc<dyn SpeechSynthesizer> = match settings.tts_provider {
            TtsProvider::Elevenlabs => {
                tracing::info!("using ElevenLabs TTS");
                Arc::new(
                    ElevenLabsTts::new(ElevenLabsConfig::new(
                        settings.elevenlabs_api_key.clone().unwrap_or_default(),
                        settings.elevenlabs_voice_id.clone(),
                    ))
                    .map_err(Error::from)?,
                )
            }
            TtsProvider::Kokoro => {
                tracing::info!(endpoint = %settings.kokoro_base_url, "using Kokoro TTS");
                Arc::new(
                    KokoroTts::new(KokoroConfig::new(
                        settings.kokoro_base_url.clone(),
                        settings.kokoro_voice.clone(),
                    ))
                    .map_err(Error::from)?,
                )
            }
        };

        Ok(Self::new(recognizer, Arc::new(generator), synthesizer))
    }
}

#[async_trait]
impl ConversationEngine for PipelineEngine {
    async fn start(&self, sink: ClientSink) -> Result<()> {
        let mut slot = self.inner.lock().await;
        if slot.is_some() {
            tracing::debug!("pipeline engine already started");
            return Ok(());
        }

        let (stt, events) = self.recognizer.connect().await?;

        let inner = Arc::new(EngineInner {
            sink,
            stt,
            generator: self.generator.clone(),
            synthesizer: self.synthesizer.clone(),
            turn_seq: AtomicU64::new(0),
            transcript: parking_lot::Mutex::new(Vec::new()),
            turn: Mutex::new(None),
            silence: parking_lot::Mutex::new(None),
            vad: parking_lot::Mutex::new(VadGate::default()),
            session: CancellationToken::new(),
        });

        tokio::spawn(orchestrate(inner.clone(), events));
        *slot = Some(inner);
        tracing::info!("pipeline engine started");
        Ok(())
    }

    async fn on_audio(&self, frame: &[u8]) {
        let inner = self.inner.lock().await.clone();
        if let Some(inner) = inner {
            inner.handle_audio(frame).await;
        }
    }

    async fn on_text(&self, message: ClientMessage) {
        let inner = self.inner.lock().await.clone();
        let Some(inner) = inner else { return };

        let ClientMessage::Text { content, turn_id } = message;
        if let Some(id) = turn_id {
            inner.turn_seq.store(id, Ordering::SeqCst);
        }
        if content.trim().is_empty() {
            return;
        }
        // A synthetic turn behaves exactly like an STT-finalized utterance
        // hitting an endpoint.
        inner.transcript.lock().push(content);
        inner.dispatch_turn().await;
    }

    async fn stop(&self) {
        let inner = self.inner.lock().await.take();
        let Some(inner) = inner else { return };

        inner.session.cancel();
        inner.disarm_silence_timer();
        if let Some(handle) = inner.turn.lock().await.take() {
            handle.token.cancel();
            let _ = handle.join.await;
        }
        inner.stt.close().await;
        tracing::info!("pipeline engine stopped");
    }

    fn name(&self) -> &'static str {
        "deepgram_pipeline"
    }
}

struct EngineInner {
    sink: ClientSink,
    stt: Box<dyn RecognizerHandle>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Current turn id; bumped on every dispatch and on every barge-in
    turn_seq: AtomicU64,
    /// Finalized fragments of the pending user turn
    transcript: parking_lot::Mutex<Vec<String>>,
    /// The live turn, if any. At most one is non-terminal per session.
    turn: Mutex<Option<TurnHandle>>,
    silence: parking_lot::Mutex<Option<JoinHandle<()>>>,
    vad: parking_lot::Mutex<VadGate>,
    session: CancellationToken,
}

struct TurnHandle {
    turn_id: TurnId,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl EngineInner {
    fn is_current(&self, turn_id: TurnId) -> bool {
        self.turn_seq.load(Ordering::SeqCst) == turn_id
    }

    async fn turn_active(&self) -> bool {
        self.turn
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.join.is_finished())
    }

    /// Local VAD runs on every inbound frame; the frame is then forwarded
    /// to the recognizer regardless, so the remote endpointer keeps seeing
    /// the user even mid-turn.
    async fn handle_audio(self: &Arc<Self>, frame: &[u8]) {
        match decode_pcm16(frame) {
            Ok(samples) => {
                let rms = frame_rms(&samples);
                if self.turn_active().await {
                    let fired = self.vad.lock().observe(rms);
                    if fired {
                        tracing::info!(
                            rms = rms as u32,
                            "barge-in: local vad confirmed sustained speech"
                        );
                        metrics::counter!("confab_barge_ins_total", "source" => "local_vad")
                            .increment(1);
                        self.interrupt_turn("local_vad").await;
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
        self.stt.send_audio(frame).await;
    }

    async fn handle_transcript(self: &Arc<Self>, text: String, is_final: bool) {
        let trimmed_len = text.trim().chars().count();

        if trimmed_len > 0 && (is_final || trimmed_len >= 2) && self.turn_active().await {
            tracing::info!(text = %text, "barge-in: user spoke during agent turn");
            metrics::counter!("confab_barge_ins_total", "source" => "stt_text").increment(1);
            self.interrupt_turn("stt_text").await;
        }

        // Live caption: pending finalized fragments plus the newest text.
        let preview = {
            let fragments = self.transcript.lock();
            let mut joined = fragments.join(" ");
            if !joined.is_empty() {
                joined.push(' ');
            }
            joined.push_str(&text);
            joined
        };

        if is_final {
            tracing::debug!(text = %text, "final transcript");
            self.arm_silence_timer();
        }

        self.sink
            .send(ServerMessage::Transcript {
                text: preview,
                is_final,
            })
            .await;

        if is_final {
            self.transcript.lock().push(text);
        }
    }

    /// (Re-)arm the local silence endpointer. Re-arming cancels any pending
    /// fire, so the timer fires at most once per arming.
    fn arm_silence_timer(self: &Arc<Self>) {
        let mut slot = self.silence.lock();
        if let Some(pending) = slot.take() {
            pending.abort();
        }
        let inner = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(SILENCE_TIMEOUT).await;
            // Clear our own handle before dispatching so nothing aborts the
            // dispatch out from under us.
            inner.silence.lock().take();
            tracing::debug!("silence timeout, forcing endpoint");
            inner.dispatch_turn().await;
        }));
    }

    fn disarm_silence_timer(&self) {
        if let Some(pending) = self.silence.lock().take() {
            pending.abort();
        }
    }

    /// Shared endpoint procedure for both endpointers and synthetic turns.
    /// An empty transcript buffer is a no-op.
    async fn dispatch_turn(self: &Arc<Self>) {
        let text = {
            let mut fragments = self.transcript.lock();
            let joined = fragments.join(" ").trim().to_string();
            fragments.clear();
            joined
        };
        if text.is_empty() {
            return;
        }

        self.interrupt_turn("new_utterance").await;

        let turn_id = self.turn_seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(turn_id, text = %text, "starting turn");
        metrics::counter!("confab_turns_total").increment(1);

        let token = self.session.child_token();
        let join = tokio::spawn(run_turn(Arc::clone(self), text, turn_id, token.clone()));
        *self.turn.lock().await = Some(TurnHandle {
            turn_id,
            token,
            join,
        });
    }

    /// Barge-in fire: cancel the live turn, await its cancellation ack,
    /// invalidate its id, tell the client to flush playback. Returns false
    /// when no turn was running.
    async fn interrupt_turn(&self, source: &str) -> bool {
        let mut slot = self.turn.lock().await;
        let Some(handle) = slot.take() else {
            return false;
        };
        if handle.join.is_finished() {
            return false;
        }

        tracing::info!(turn_id = handle.turn_id, source, "cancelling live turn");
        handle.token.cancel();
        if let Err(e) = handle.join.await {
            tracing::warn!(error = %e, "turn task ended abnormally");
        }
        drop(slot);

        self.turn_seq.fetch_add(1, Ordering::SeqCst);
        self.vad.lock().reset();
        self.sink.send(ServerMessage::StopAudio).await;
        true
    }

    async fn send_audio_frame(&self, frame: Vec<u8>, turn_id: TurnId) {
        self.sink
            .send(ServerMessage::Audio {
                data: BASE64.encode(&frame),
                turn_id,
            })
            .await;
    }
}

/// STT event loop for one session.
async fn orchestrate(inner: Arc<EngineInner>, mut events: mpsc::Receiver<SttEvent>) {
    loop {
        let event = tokio::select! {
            _ = inner.session.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            // The recognizer dropped mid-session; no recovery is attempted.
            // The session stays alive until the client channel closes.
            tracing::warn!("recognizer event stream closed");
            break;
        };

        match event {
            SttEvent::Transcript { text, is_final } => {
                inner.handle_transcript(text, is_final).await;
            }
            SttEvent::SpeechStarted => {
                tracing::debug!("user speech started");
                inner.disarm_silence_timer();
            }
            SttEvent::UtteranceEnd => {
                tracing::debug!("recognizer utterance end");
                inner.disarm_silence_timer();
                inner.dispatch_turn().await;
            }
            SttEvent::Error { reason } => {
                tracing::warn!(%reason, "recognizer error");
            }
        }
    }
}

/// Cancels and reaps a helper task when the owning scope exits.
struct TaskGuard {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.join.abort();
    }
}

/// One LLM + TTS response turn.
async fn run_turn(
    inner: Arc<EngineInner>,
    text: String,
    turn_id: TurnId,
    token: CancellationToken,
) {
    inner
        .sink
        .send(ServerMessage::State {
            state: EngineState::Processing,
            turn_id: Some(turn_id),
        })
        .await;

    let keepalive_token = token.child_token();
    let keepalive = tokio::spawn(keepalive_loop(Arc::clone(&inner), keepalive_token.clone()));
    let _keepalive_guard = TaskGuard {
        token: keepalive_token,
        join: keepalive,
    };

    let mut fragments = inner.generator.generate(&text);
    let mut splitter = SentenceSplitter::new();
    let mut cancelled = false;

    'stream: loop {
        let fragment = tokio::select! {
            _ = token.cancelled() => {
                cancelled = true;
                break 'stream;
            }
            fragment = fragments.recv() => fragment,
        };
        let Some(fragment) = fragment else { break };

        for sentence in splitter.push(&fragment) {
            if speak(&inner, &sentence, turn_id, &token).await.is_break() {
                cancelled = true;
                break 'stream;
            }
        }
    }

    if !cancelled {
        if let Some(residual) = splitter.flush() {
            cancelled = speak(&inner, &residual, turn_id, &token).await.is_break();
        }
    }

    if cancelled {
        tracing::info!(turn_id, "turn cancelled");
        return;
    }

    tokio::select! {
        _ = token.cancelled() => {
            tracing::info!(turn_id, "turn cancelled during tail guard");
        }
        _ = tokio::time::sleep(TAIL_ECHO_GUARD) => {
            inner.sink.send(ServerMessage::TurnComplete).await;
            tracing::info!(turn_id, "turn complete");
        }
    }
}

async fn keepalive_loop(inner: Arc<EngineInner>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {
                inner.stt.keepalive().await;
            }
        }
    }
}

/// Emit one sentence: response text first, then rebuffered audio envelopes
/// tagged with the dispatching turn's id, then a soft-backpressure pause of
/// half the estimated playback time.
async fn speak(
    inner: &Arc<EngineInner>,
    sentence: &str,
    turn_id: TurnId,
    token: &CancellationToken,
) -> ControlFlow<()> {
    if token.is_cancelled() || !inner.is_current(turn_id) {
        return ControlFlow::Break(());
    }

    tracing::debug!(turn_id, sentence = %sentence, "synthesizing sentence");
    inner
        .sink
        .send(ServerMessage::ResponseChunk {
            content: format!("{sentence} "),
        })
        .await;

    let mut chunks = inner.synthesizer.stream(sentence);
    let mut rebuffer = AudioRebuffer::default();
    let mut sent_bytes = 0usize;

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => return ControlFlow::Break(()),
            chunk = chunks.recv() => chunk,
        };
        let Some(chunk) = chunk else { break };

        if let Some(frame) = rebuffer.push(&chunk) {
            if token.is_cancelled() || !inner.is_current(turn_id) {
                return ControlFlow::Break(());
            }
            sent_bytes += frame.len();
            inner.send_audio_frame(frame, turn_id).await;
        }
    }

    if let Some(tail) = rebuffer.flush() {
        if token.is_cancelled() || !inner.is_current(turn_id) {
            return ControlFlow::Break(());
        }
        sent_bytes += tail.len();
        inner.send_audio_frame(tail, turn_id).await;
    }

    let pause = Duration::from_secs_f64(sent_bytes as f64 / OUTPUT_BYTES_PER_SEC * 0.5);
    tokio::select! {
        _ = token.cancelled() => ControlFlow::Break(()),
        _ = tokio::time::sleep(pause) => ControlFlow::Continue(()),
    }
}
