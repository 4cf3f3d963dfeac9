use super::{ConfigError, ServerConfig};

/// Every environment variable the gateway reads.
pub(crate) const ENV_VARS: [&str; 12] = [
    "HOST",
    "PORT",
    "GEMINI_MODEL",
    "GEMINI_SYSTEM_INSTRUCTION",
    "GEMINI_WS_URL",
    "GEMINI_SETUP_TIMEOUT",
    "GEMINI_OAUTH_SCOPE",
    "GEMINI_ACCESS_TOKEN",
    "GEMINI_API_KEY",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "LOG_JSON",
];

/// Read a variable, treating empty strings as unset.
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    name,
                    message: format!("{raw:?}: {e}"),
                })
        })
        .transpose()
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Build a config from environment variables layered over defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let defaults = ServerConfig::default();

    let log_json = match var("LOG_FORMAT") {
        Some(format) => format.eq_ignore_ascii_case("json"),
        None => var("LOG_JSON").map(|v| parse_bool(&v)).unwrap_or(false),
    };

    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| defaults.host.clone()),
        port: parse_var("PORT")?.unwrap_or(defaults.port),
        gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| defaults.gemini_model.clone()),
        system_instruction: var("GEMINI_SYSTEM_INSTRUCTION")
            .unwrap_or_else(|| defaults.system_instruction.clone()),
        gemini_ws_url: var("GEMINI_WS_URL").unwrap_or_else(|| defaults.gemini_ws_url.clone()),
        setup_timeout_seconds: parse_var("GEMINI_SETUP_TIMEOUT")?
            .unwrap_or(defaults.setup_timeout_seconds),
        oauth_scope: var("GEMINI_OAUTH_SCOPE").unwrap_or_else(|| defaults.oauth_scope.clone()),
        access_token: var("GEMINI_ACCESS_TOKEN"),
        api_key: var("GEMINI_API_KEY"),
        log_level: var("LOG_LEVEL").unwrap_or_else(|| defaults.log_level.clone()),
        log_json,
    })
}
