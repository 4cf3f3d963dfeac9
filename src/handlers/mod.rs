//! HTTP and WebSocket request handlers
//!
//! - `api` - Banner and health check
//! - `live` - Voice session WebSocket bridged to Gemini Live

pub mod api;
pub mod live;

pub use live::live_handler;
