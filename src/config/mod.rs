//! Configuration module for the Live Voice Gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading and overlay
//!
//! # Example
//! ```rust,no_run
//! use live_voice_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthSettings;

mod env;
mod yaml;

pub use yaml::YamlConfig;

/// Gemini Live bidirectional streaming endpoint.
pub const DEFAULT_GEMINI_WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model.
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// OAuth scope required by the Generative Language API.
pub const DEFAULT_OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/generative-language";

/// Default persona sent as the system instruction.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "A warm, rounded, and friendly male cartoon voice. \
The character sounds like a chubby, honest piggy. The tone is soft, slightly deep but very cute, \
not scary. The speaking pace is relaxed and slightly slow, giving a feeling of being thoughtful \
and trustworthy. It has a tiny bit of nasal resonance (to hint at being a pig) but remains very \
clear and pleasant to listen to. Think of a mix between Winnie the Pooh and Baymax. It sounds \
optimistic, patient, and soothing for children. Please respond to the child.";

/// Default handshake timeout in seconds.
pub const DEFAULT_SETUP_TIMEOUT_SECONDS: f64 = 15.0;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port)
/// - Gemini Live session settings (model, instruction, handshake timeout, endpoint)
/// - Credential settings (OAuth scope, access token override, forbidden API key)
/// - Logging settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Gemini Live settings
    pub gemini_model: String,
    pub system_instruction: String,
    pub gemini_ws_url: String,
    /// Seconds to wait for `setupComplete` after the setup envelope is sent
    pub setup_timeout_seconds: f64,

    // Credentials
    pub oauth_scope: String,
    /// Explicit bearer token; bypasses Application Default Credentials entirely
    pub access_token: Option<String>,
    /// API keys cannot authenticate the Live WebSocket; presence is a hard error
    pub api_key: Option<String>,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

/// Zeroize secret fields when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.access_token {
            token.zeroize();
        }
        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            gemini_ws_url: DEFAULT_GEMINI_WS_URL.to_string(),
            setup_timeout_seconds: DEFAULT_SETUP_TIMEOUT_SECONDS,
            oauth_scope: DEFAULT_OAUTH_SCOPE.to_string(),
            access_token: None,
            api_key: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// The `.env` file is loaded in `main.rs` before this is called, so its
    /// values appear here as ordinary environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variables as the base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        yaml_config.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Handshake deadline as a [`Duration`]
    ///
    /// Values rejected by validation fall back to the default deadline.
    pub fn setup_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.setup_timeout_seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_SETUP_TIMEOUT_SECONDS))
    }

    /// Token selection settings for the credential provider
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            oauth_scope: self.oauth_scope.clone(),
            access_token: self.access_token.clone(),
            api_key_configured: self.api_key.as_ref().is_some_and(|k| !k.is_empty()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PORT",
                message: "port must be non-zero".to_string(),
            });
        }

        let timeout_valid = self.setup_timeout_seconds > 0.0
            && Duration::try_from_secs_f64(self.setup_timeout_seconds).is_ok();
        if !timeout_valid {
            return Err(ConfigError::InvalidValue {
                name: "GEMINI_SETUP_TIMEOUT",
                message: format!(
                    "must be a positive number of seconds, got {}",
                    self.setup_timeout_seconds
                ),
            });
        }

        let url = url::Url::parse(&self.gemini_ws_url).map_err(|e| ConfigError::InvalidValue {
            name: "GEMINI_WS_URL",
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue {
                name: "GEMINI_WS_URL",
                message: format!("scheme must be ws or wss, got {}", url.scheme()),
            });
        }

        if self.gemini_model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "GEMINI_MODEL",
                message: "model must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
