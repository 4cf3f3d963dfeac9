use thiserror::Error;

use crate::auth::AuthError;
use crate::core::live::LiveError;
use crate::core::transport::TransportError;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No bearer token could be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Connecting or writing upstream failed
    #[error(transparent)]
    Live(#[from] LiveError),

    /// Sending the setup message failed
    #[error("Failed to send Gemini setup: {0}")]
    Setup(#[from] TransportError),

    /// The downstream writer has already shut down
    #[error("Client connection closed")]
    DownstreamClosed,
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
