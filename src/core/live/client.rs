//! Gemini Live WebSocket client.
//!
//! [`LiveConnector`] opens the upstream socket; [`UpstreamWriter`] owns its
//! sink afterwards so every outbound message goes through one task and
//! frames are never interleaved.

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tracing::Instrument;
use url::Url;

use super::error::{LiveError, LiveResult};
use super::messages::ClientEnvelope;
use crate::core::transport::{Frame, FrameSink, Transport};

/// Opens an authenticated upstream connection.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect using `token` as the OAuth2 bearer credential.
    async fn connect(&self, token: &str) -> LiveResult<Transport>;
}

/// Connector for the public Gemini Live endpoint.
#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    url: String,
}

impl GeminiLiveConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn host_header(&self) -> LiveResult<String> {
        let parsed = Url::parse(&self.url).map_err(|e| LiveError::InvalidEndpoint(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| LiveError::InvalidEndpoint(format!("{} has no host", self.url)))?;
        Ok(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, token: &str) -> LiveResult<Transport> {
        let request = http::Request::builder()
            .uri(&self.url)
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", self.host_header()?)
            .body(())
            .map_err(|e| LiveError::InvalidEndpoint(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;

        tracing::info!("Connected to Gemini Live API");

        Ok(Transport::from_tungstenite(ws_stream))
    }
}

enum UpstreamCommand {
    Send(ClientEnvelope),
    Ping,
    Close,
}

/// Payload carried by keep-alive pings.
const KEEPALIVE_PAYLOAD: &[u8] = b"keepalive";

/// Cloneable handle feeding the single task that owns the upstream sink.
///
/// Enqueueing never blocks, so it is safe to call while holding a
/// synchronous lock.
#[derive(Clone)]
pub struct UpstreamWriter {
    tx: mpsc::UnboundedSender<UpstreamCommand>,
}

impl UpstreamWriter {
    /// Take ownership of `sink` and start the writer task.
    ///
    /// The task ends after [`close`](Self::close), when every handle is
    /// dropped, or on the first write error. The sink is closed on exit.
    pub fn spawn(sink: FrameSink) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_upstream(sink, rx).instrument(tracing::Span::current()));
        (Self { tx }, handle)
    }

    pub fn send(&self, envelope: ClientEnvelope) -> LiveResult<()> {
        self.tx
            .send(UpstreamCommand::Send(envelope))
            .map_err(|_| LiveError::NotConnected)
    }

    pub fn send_audio(&self, pcm: &[u8]) -> LiveResult<()> {
        self.send(ClientEnvelope::audio(pcm))
    }

    pub fn end_audio_stream(&self) -> LiveResult<()> {
        self.send(ClientEnvelope::audio_stream_end())
    }

    /// Queue a keep-alive ping behind any pending messages.
    pub fn ping(&self) -> LiveResult<()> {
        self.tx
            .send(UpstreamCommand::Ping)
            .map_err(|_| LiveError::NotConnected)
    }

    /// Ask the writer to flush and close the upstream socket.
    pub fn close(&self) {
        // Already gone means already closed.
        let _ = self.tx.send(UpstreamCommand::Close);
    }
}

async fn write_upstream(mut sink: FrameSink, mut rx: mpsc::UnboundedReceiver<UpstreamCommand>) {
    while let Some(command) = rx.recv().await {
        let frame = match command {
            UpstreamCommand::Send(envelope) => match serde_json::to_string(&envelope) {
                Ok(json) => Frame::Text(json),
                Err(e) => {
                    tracing::error!("Failed to serialize upstream message: {}", e);
                    continue;
                }
            },
            UpstreamCommand::Ping => Frame::Ping(Bytes::from_static(KEEPALIVE_PAYLOAD)),
            UpstreamCommand::Close => break,
        };

        if let Err(e) = sink.send(frame).await {
            tracing::error!("Failed to send upstream message: {}", e);
            break;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!("Error closing upstream socket: {}", e);
    }
}
