use serde::Deserialize;
use std::path::Path;

use super::{ConfigError, ServerConfig};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override whatever the environment provided.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///
/// gemini:
///   model: "models/gemini-2.5-flash-native-audio-preview-12-2025"
///   system_instruction: "You are a helpful voice assistant."
///   oauth_scope: "https://www.googleapis.com/auth/generative-language"
///   access_token: "ya29...."
///   setup_timeout_seconds: 15
///   ws_url: "wss://generativelanguage.googleapis.com/ws/..."
///
/// logging:
///   level: "info"
///   json: false
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub gemini: Option<GeminiYaml>,
    pub logging: Option<LoggingYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Gemini Live configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub oauth_scope: Option<String>,
    pub access_token: Option<String>,
    pub api_key: Option<String>,
    pub setup_timeout_seconds: Option<f64>,
    pub ws_url: Option<String>,
}

/// Logging configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&contents)
    }

    /// Parse YAML configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Overlay every value present in this document onto `config`.
    pub(super) fn apply(self, config: &mut ServerConfig) {
        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }

        if let Some(gemini) = self.gemini {
            if let Some(model) = gemini.model {
                config.gemini_model = model;
            }
            if let Some(instruction) = gemini.system_instruction {
                config.system_instruction = instruction;
            }
            if let Some(scope) = gemini.oauth_scope {
                config.oauth_scope = scope;
            }
            if let Some(token) = gemini.access_token.filter(|t| !t.is_empty()) {
                config.access_token = Some(token);
            }
            if let Some(key) = gemini.api_key.filter(|k| !k.is_empty()) {
                config.api_key = Some(key);
            }
            if let Some(timeout) = gemini.setup_timeout_seconds {
                config.setup_timeout_seconds = timeout;
            }
            if let Some(url) = gemini.ws_url {
                config.gemini_ws_url = url;
            }
        }

        if let Some(logging) = self.logging {
            if let Some(level) = logging.level {
                config.log_level = level;
            }
            if let Some(json) = logging.json {
                config.log_json = json;
            }
        }
    }
}
