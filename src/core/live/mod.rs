//! Gemini Live API protocol adapter and client.

pub mod client;
pub mod config;
pub mod error;
pub mod messages;

pub use client::{GeminiLiveConnector, LiveConnector, UpstreamWriter};
pub use config::{INPUT_AUDIO_MIME_TYPE, KeepAlive, LiveSetupConfig};
pub use error::{LiveError, LiveResult};
pub use messages::{ClientEnvelope, LiveEvent, decode_server_message};
