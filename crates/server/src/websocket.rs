//! WebSocket session loop
//!
//! The session loop owns the client channel. It lends the engine a send
//! capability (a bounded mpsc drained by the forwarder task, preserving
//! emission order) and forwards inbound frames: binary PCM to `on_audio`,
//! recognized JSON text frames to `on_text`. Whatever way the loop exits,
//! `engine.stop()` runs before the socket is dropped.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use confab_core::{ClientMessage, ClientSink};
use confab_engine::create_engine;

use crate::state::AppState;

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Handle the WebSocket upgrade at `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    metrics::counter!("confab_sessions_total").increment(1);
    tracing::info!(%session_id, "client connected");

    let engine = match create_engine(&state.settings, &state.system_prompt) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(%session_id, error = %e, "no engine available for session");
            return;
        }
    };
    tracing::info!(%session_id, engine = engine.name(), "session engine selected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut outbound) = ClientSink::channel(OUTBOUND_CHANNEL_CAPACITY);

    // Forwarder: engine messages reach the socket in emission order.
    let forward = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let frame = match serde_json::to_string(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    if let Err(e) = engine.start(sink).await {
        tracing::error!(%session_id, error = %e, "engine start failed");
        engine.stop().await;
        forward.abort();
        return;
    }

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Binary(frame)) => {
                engine.on_audio(&frame).await;
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => engine.on_text(message).await,
                Err(_) => {
                    tracing::debug!(%session_id, "ignoring unrecognized text frame");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(%session_id, "client closed the channel");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "client channel error");
                break;
            }
        }
    }

    engine.stop().await;
    forward.abort();
    tracing::info!(%session_id, "session closed");
}
