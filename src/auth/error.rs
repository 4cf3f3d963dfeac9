use thiserror::Error;

/// Errors produced while obtaining a bearer token for the Live API.
#[derive(Debug, Error)]
pub enum AuthError {
    /// An API key was configured; the Live WebSocket only accepts OAuth2 bearer tokens
    #[error("API keys are not supported for Gemini Live API WebSocket. Use OAuth2.")]
    UnsupportedCredential,

    /// The discovered credential was granted scopes that exclude the required one
    #[error(
        "ADC missing required scope. Run: gcloud auth application-default login \
         --scopes={scope},https://www.googleapis.com/auth/cloud-platform \
         or set GEMINI_ACCESS_TOKEN."
    )]
    MissingScope { scope: String },

    /// Refresh succeeded but produced no token
    #[error("Failed to obtain access token")]
    EmptyToken,

    /// No Application Default Credentials could be located
    #[error("No usable credentials found: {0}")]
    NoCredentials(String),

    /// A credentials file was found but could not be used
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The credential could not mint a token
    #[error("Failed to refresh access token: {0}")]
    Refresh(String),
}

/// Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;
