//! WebSocket server for the confab voice backend
//!
//! One WebSocket connection is one conversation session: the session loop
//! owns the socket, builds an engine from configuration and shuttles frames
//! between the client and the engine.

pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
