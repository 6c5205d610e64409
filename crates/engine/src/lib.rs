//! Conversation orchestration engines
//!
//! Two engines share one contract: the full pipeline (streaming STT ->
//! LLM -> TTS with turn control and barge-in) and the native-audio duplex
//! relay, where a single bidirectional service handles the whole exchange
//! and the orchestrator degenerates to a relay plus local-VAD barge-in.

pub mod duplex;
pub mod factory;
pub mod pipeline;

pub use duplex::{DuplexConfig, DuplexEngine};
pub use factory::create_engine;
pub use pipeline::PipelineEngine;

use async_trait::async_trait;

use confab_core::{ClientMessage, ClientSink, Result};

/// Per-session conversation engine.
///
/// The session loop owns the client channel and calls into the engine; the
/// engine owns every adapter, buffer and task it spawns and only holds the
/// `ClientSink` send capability.
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    /// Open remote sessions and spawn the orchestrator. Idempotent; a
    /// second call is a no-op. Connect failure is fatal to the session.
    async fn start(&self, sink: ClientSink) -> Result<()>;

    /// Deliver one binary PCM16 frame from the client.
    async fn on_audio(&self, frame: &[u8]);

    /// Deliver a recognized client text frame.
    async fn on_text(&self, message: ClientMessage);

    /// Cancel all subtasks and close remote sessions. Idempotent. Already
    /// emitted messages are neither reordered nor dropped.
    async fn stop(&self);

    /// Engine name for logging.
    fn name(&self) -> &'static str;
}
