//! Send capability for the client channel
//!
//! The session loop owns the WebSocket; the engine and its subtasks only
//! hold a `ClientSink`, a bounded mpsc sender drained by the session's
//! forwarder task. Messages are delivered in send order, which is what the
//! per-turn ordering contract relies on.

use tokio::sync::mpsc;

use crate::message::ServerMessage;

/// Cloneable send-to-client capability.
#[derive(Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<ServerMessage>,
}

impl ClientSink {
    /// Create a sink plus the receiver the session loop drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message for the client.
    ///
    /// A closed channel means the client went away; the message is dropped
    /// and the caller keeps going until the session loop tears it down.
    pub async fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).await.is_err() {
            tracing::debug!("client channel closed, dropping outbound message");
        }
    }

    /// Whether the session loop has dropped the receiving side.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
