use thiserror::Error;

/// Errors talking to the Gemini Live endpoint.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The WebSocket handshake failed
    #[error("Failed to connect to Gemini Live: {0}")]
    ConnectionFailed(String),

    /// The configured endpoint could not be turned into a request
    #[error("Invalid Gemini Live endpoint: {0}")]
    InvalidEndpoint(String),

    /// An outbound message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The upstream writer has already shut down
    #[error("Gemini Live connection is not open")]
    NotConnected,
}

/// Result type for Live API operations.
pub type LiveResult<T> = Result<T, LiveError>;
