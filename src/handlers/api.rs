/// Service banner
pub async fn root() -> &'static str {
    "Gemini Live Voice Gateway"
}

/// Liveness probe
pub async fn health_check() -> &'static str {
    "ok"
}
