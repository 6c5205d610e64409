//! Wire messages for the client duplex channel
//!
//! The client sends binary PCM16 frames and JSON text frames; the backend
//! replies with JSON text frames only. All JSON frames carry a `type` tag.

use serde::{Deserialize, Serialize};

/// Per-session monotone turn counter.
///
/// Every outbound audio envelope carries the id of the turn that produced it
/// so the client can discard chunks made stale by a barge-in. Ids never
/// decrease; gaps appear only where a barge-in invalidated a turn.
pub type TurnId = u64;

/// Engine lifecycle states surfaced to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Processing,
    Speaking,
    Idle,
}

/// Messages sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Lifecycle hint for the current turn
    State {
        state: EngineState,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_id: Option<TurnId>,
    },
    /// Live caption, interim or final
    Transcript { text: String, is_final: bool },
    /// Assistant text, sentence-sized
    ResponseChunk { content: String },
    /// Base64 PCM 24 kHz 16-bit mono chunk, >= 4 KB except the tail
    Audio { data: String, turn_id: TurnId },
    /// Drop the playback queue immediately
    StopAudio,
    /// End-of-turn marker
    TurnComplete,
}

/// Recognized JSON text frames from the client
///
/// Unknown `type` tags fail to parse and are ignored by the session loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Synthetic user turn, bypassing STT
    Text {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_id: Option<TurnId>,
    },
}

/// Events produced by a streaming recognizer, in arrival order.
///
/// `UtteranceEnd` always follows the final `Transcript` events of the same
/// utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum SttEvent {
    Transcript { text: String, is_final: bool },
    SpeechStarted,
    UtteranceEnd,
    Error { reason: String },
}
