//! Gemini Live session setup parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Mime type announced for every forwarded microphone chunk.
pub const INPUT_AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Response modality requested in the setup message.
pub const RESPONSE_MODALITY_AUDIO: &str = "AUDIO";

/// Barge-in policy: new user speech interrupts the model's current turn.
pub const ACTIVITY_HANDLING_INTERRUPTS: &str = "START_OF_ACTIVITY_INTERRUPTS";

/// Per-session parameters carried in the setup message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSetupConfig {
    /// Model resource name, e.g. `models/gemini-2.5-flash-native-audio-preview-12-2025`
    pub model: String,
    /// Persona prompt sent as the system instruction
    pub system_instruction: String,
}

impl LiveSetupConfig {
    pub fn new(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
        }
    }
}

/// Upstream WebSocket keep-alive.
///
/// A ping is sent every `interval`; if its pong has not arrived within
/// `timeout` the socket is treated as dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(20),
        }
    }
}
