pub mod auth;
pub mod config;
pub mod core;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use auth::{AuthError, AuthResult, CredentialProvider};
pub use config::ServerConfig;
pub use crate::core::{
    GeminiLiveConnector, LiveConnector, LiveSession, SessionConfig, SessionOutcome,
    ShutdownReason, Transport,
};
pub use state::AppState;

use std::sync::Arc;

/// Build the full application router: `/`, `/health` and `/ws`.
pub fn app(state: Arc<AppState>) -> axum::Router {
    routes::api::create_api_router()
        .merge(routes::live::create_live_router())
        .with_state(state)
}
