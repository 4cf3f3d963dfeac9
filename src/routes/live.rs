//! Voice session WebSocket route

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::live_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the voice session router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade
///
/// # Protocol
///
/// Client sends:
/// - Binary frames of 16 kHz, 16-bit, mono PCM
/// - `{"type": "stop"}` when the user is done talking
///
/// Server sends:
/// - `{"type": "ready"}` once Gemini accepted the session setup
/// - Binary frames of 24 kHz, 16-bit, mono PCM
/// - `{"type": "interrupted"}` when the model was cut off
/// - `{"type": "turn_complete"}` when the model finished a turn
/// - `{"type": "error", "message": ..., "details": ...}` before closing on failure
pub fn create_live_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(live_handler))
        .layer(TraceLayer::new_for_http())
}
