use std::sync::Arc;

use crate::auth::{ApplicationDefaultCredentials, CredentialProvider, CredentialSource};
use crate::config::ServerConfig;
use crate::core::live::{GeminiLiveConnector, LiveConnector};
use crate::core::session::{LiveSession, SessionConfig};

/// Process-wide state shared by every connection.
///
/// The credential provider is the only mutable piece; it caches one
/// credential for the whole process.
pub struct AppState {
    pub credentials: Arc<CredentialProvider>,
    pub connector: Arc<dyn LiveConnector>,
    pub session: SessionConfig,
}

impl AppState {
    /// Production wiring: Application Default Credentials and the configured Gemini endpoint.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let source: Arc<dyn CredentialSource> = Arc::new(ApplicationDefaultCredentials::new());
        let connector: Arc<dyn LiveConnector> =
            Arc::new(GeminiLiveConnector::new(&config.gemini_ws_url));
        Self::with_components(config, source, connector)
    }

    /// Wire the state with explicit collaborators.
    ///
    /// `config` is only read here; its secrets are wiped when it drops.
    pub fn with_components(
        config: ServerConfig,
        source: Arc<dyn CredentialSource>,
        connector: Arc<dyn LiveConnector>,
    ) -> Arc<Self> {
        let credentials = Arc::new(CredentialProvider::new(config.auth_settings(), source));
        let session = SessionConfig::from_server_config(&config);
        Arc::new(Self {
            credentials,
            connector,
            session,
        })
    }

    /// A fresh session bound to the shared collaborators.
    pub fn new_session(&self) -> LiveSession {
        LiveSession::new(
            self.credentials.clone(),
            self.connector.clone(),
            self.session.clone(),
        )
    }
}
