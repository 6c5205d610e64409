//! HTTP router

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ws", get(websocket::ws_handler))
        .route("/metrics", get(render_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness hello
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "confab backend is online" }))
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
