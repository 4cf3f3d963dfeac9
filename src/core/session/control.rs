//! Downstream (client-facing) message types.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

// =============================================================================
// Incoming
// =============================================================================

/// A frame received from the client, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Raw 16 kHz PCM
    AudioFrame(Bytes),
    /// `{"type": "stop"}`: the user finished talking
    Stop,
    /// Any other well-formed text message; ignored
    Other,
}

impl ClientMessage {
    /// Classify a text frame. Malformed JSON is an error; callers drop it.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let payload: Value = serde_json::from_str(text)?;
        Ok(match payload.get("type").and_then(Value::as_str) {
            Some("stop") => Self::Stop,
            _ => Self::Other,
        })
    }
}

// =============================================================================
// Outgoing
// =============================================================================

/// JSON control messages sent to the client alongside binary audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Upstream setup finished; audio is now forwarded live
    Ready,
    /// The model's turn was interrupted by new speech
    Interrupted,
    /// The model finished its turn
    TurnComplete,
    /// Something went wrong; the session usually closes right after
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl ControlMessage {
    pub fn error(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// Work item for the downstream writer task.
pub enum DownstreamRoute {
    /// JSON control message
    Control(ControlMessage),
    /// Model audio
    Audio(Bytes),
    /// Close the client socket
    Close,
}
