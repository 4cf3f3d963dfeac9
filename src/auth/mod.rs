//! Upstream authentication.
//!
//! The Live API WebSocket accepts OAuth2 bearer tokens only. Tokens come from
//! an explicit override or from Application Default Credentials, cached
//! process-wide by [`CredentialProvider`].

pub mod adc;
mod error;
mod provider;

pub use adc::ApplicationDefaultCredentials;
pub use error::{AuthError, AuthResult};
pub use provider::{
    AccessToken, AuthSettings, Credential, CredentialKind, CredentialProvider, CredentialSource,
    EXPIRY_SKEW,
};
