//! Provider trait seams
//!
//! Each remote service is consumed through a small trait so the engine can
//! be exercised against scripted implementations and so provider selection
//! stays a configuration concern.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::SttEvent;

/// Streaming speech-to-text service.
///
/// `connect` establishes the recognizer session and returns the duplex
/// halves: a handle for audio/keepalive/close and the ordered event stream.
/// Connect failure is fatal to the session.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn connect(&self) -> Result<(Box<dyn RecognizerHandle>, mpsc::Receiver<SttEvent>)>;
}

/// Write side of a live recognizer session.
#[async_trait]
pub trait RecognizerHandle: Send + Sync {
    /// Best-effort frame delivery; drops cleanly once the recognizer closed.
    async fn send_audio(&self, frame: &[u8]);

    /// Application-level liveness ping to prevent idle-close.
    async fn keepalive(&self);

    /// Terminate the recognizer session.
    async fn close(&self);
}

/// Streaming response generator (LLM plus tool rounds).
///
/// The returned receiver yields content fragments as they arrive; tool-call
/// round-trips are internal and show up only as latency. Dropping the
/// receiver cancels the upstream read.
pub trait ResponseGenerator: Send + Sync {
    fn generate(&self, text: &str) -> mpsc::Receiver<String>;
}

/// Sentence-to-audio synthesizer.
///
/// Yields PCM 24 kHz 16-bit mono chunks. Implementations end the stream
/// with an empty tail on error so a turn can terminate cleanly.
pub trait SpeechSynthesizer: Send + Sync {
    fn stream(&self, text: &str) -> mpsc::Receiver<Vec<u8>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
