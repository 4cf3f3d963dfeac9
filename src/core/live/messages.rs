//! Gemini Live API WebSocket message types.
//!
//! Client messages (sent to Gemini):
//! - `setup` - Model, response modality, system instruction and barge-in policy
//! - `realtimeInput.audio` - One base64 PCM chunk
//! - `realtimeInput.audioStreamEnd` - The user stopped talking
//!
//! Server messages are decoded into [`LiveEvent`]s. A single frame can carry
//! several markers at once; they are emitted in a fixed order.

use base64::prelude::*;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::config::{
    ACTIVITY_HANDLING_INTERRUPTS, INPUT_AUDIO_MIME_TYPE, LiveSetupConfig, RESPONSE_MODALITY_AUDIO,
};

// =============================================================================
// Client Messages
// =============================================================================

/// Top-level envelope for everything the gateway sends upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEnvelope {
    /// First message of every session
    Setup(Setup),
    /// Streaming audio input
    RealtimeInput(RealtimeInput),
}

impl ClientEnvelope {
    /// Build the session setup message.
    pub fn setup(config: &LiveSetupConfig) -> Self {
        Self::Setup(Setup {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![RESPONSE_MODALITY_AUDIO.to_string()],
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            },
            realtime_input_config: RealtimeInputConfig {
                activity_handling: ACTIVITY_HANDLING_INTERRUPTS.to_string(),
            },
        })
    }

    /// Wrap one chunk of 16 kHz PCM.
    pub fn audio(pcm: &[u8]) -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: Some(Blob {
                mime_type: INPUT_AUDIO_MIME_TYPE.to_string(),
                data: BASE64_STANDARD.encode(pcm),
            }),
            audio_stream_end: None,
        })
    }

    /// Signal the end of the user's audio stream.
    pub fn audio_stream_end() -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: None,
            audio_stream_end: Some(true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub realtime_input_config: RealtimeInputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputConfig {
    pub activity_handling: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

/// Inline binary payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

// =============================================================================
// Server Events
// =============================================================================

/// Something the upstream model told us.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Setup accepted; audio may now flow
    SetupComplete,
    /// Error or RPC status payload, passed through untouched
    Error(Value),
    /// The model's current turn was cut off by new user activity
    Interrupted,
    /// Decoded 24 kHz PCM from an inline part
    AudioData(Bytes),
    /// The model finished its turn
    TurnComplete,
}

/// Decode one text frame from upstream.
///
/// Markers are checked independently and emitted in this order: setup
/// complete, error, interrupted, audio parts (in list order), turn complete.
/// A part whose payload is not valid base64 is skipped without affecting the
/// rest of the frame.
pub fn decode_server_message(text: &str) -> Result<Vec<LiveEvent>, serde_json::Error> {
    let message: Value = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if message.get("setupComplete").is_some_and(|v| !v.is_null()) {
        events.push(LiveEvent::SetupComplete);
    }

    if let Some(detail) = truthy_field(&message, "error").or_else(|| truthy_field(&message, "rpcStatus")) {
        events.push(LiveEvent::Error(detail.clone()));
    }

    let Some(content) = message.get("serverContent") else {
        return Ok(events);
    };

    if truthy_field(content, "interrupted").is_some() {
        events.push(LiveEvent::Interrupted);
    }

    let parts = content
        .get("modelTurn")
        .and_then(|turn| turn.get("parts"))
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        let inline = truthy_field(part, "inlineData").or_else(|| truthy_field(part, "inline_data"));
        let Some(data) = inline.and_then(|i| i.get("data")).and_then(Value::as_str) else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        match BASE64_STANDARD.decode(data) {
            Ok(pcm) => events.push(LiveEvent::AudioData(Bytes::from(pcm))),
            Err(e) => tracing::warn!("Skipping undecodable audio part: {}", e),
        }
    }

    if truthy_field(content, "turnComplete").is_some() {
        events.push(LiveEvent::TurnComplete);
    }

    Ok(events)
}

/// Field lookup that treats null, false, zero and empty values as absent.
fn truthy_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}
