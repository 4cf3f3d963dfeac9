//! Per-connection session orchestration.
//!
//! A session bridges one client socket to one Gemini Live socket:
//!
//! ```text
//! CONNECTING -> AWAITING_HANDSHAKE -> READY -> CLOSING -> CLOSED
//!      |                |
//!      +----------------+--> CLOSING (connect failure, timeout, closure)
//! ```
//!
//! Once connected, three workers run concurrently: client to upstream,
//! upstream to client, and a handshake watchdog. Whichever first trips the
//! shared [`ShutdownSignal`] decides the outcome; the others are cancelled
//! and both sockets are closed exactly once.
//!
//! The upstream leg also keeps the Gemini socket alive: it pings on a fixed
//! interval and treats a missing pong as a closed connection.
//!
//! Each socket has a single writer task. The client socket is fed through
//! a bounded [`DownstreamRoute`] channel and the upstream socket through an
//! [`UpstreamWriter`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tracing::{Instrument, Span, debug, error, info, trace, warn};

use super::buffer::{Admission, StagingGate};
use super::control::{ClientMessage, ControlMessage, DownstreamRoute};
use super::error::{SessionError, SessionResult};
use super::shutdown::{ShutdownReason, ShutdownSignal};
use crate::auth::CredentialProvider;
use crate::config::ServerConfig;
use crate::core::live::{
    ClientEnvelope, KeepAlive, LiveConnector, LiveError, LiveEvent, LiveSetupConfig,
    UpstreamWriter, decode_server_message,
};
use crate::core::transport::{
    CLOSE_ABNORMAL, CLOSE_INTERNAL_ERROR, CLOSE_NO_STATUS, CloseInfo, Frame, FrameSink, FrameStream, Transport,
};

/// Channel buffer between the workers and the client writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Upper bound on waiting for a socket to finish closing
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub setup: LiveSetupConfig,
    /// How long to wait for `setupComplete` after sending setup
    pub setup_timeout: Duration,
    pub keepalive: KeepAlive,
}

impl SessionConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            setup: LiveSetupConfig::new(&config.gemini_model, &config.system_instruction),
            setup_timeout: config.setup_timeout(),
            keepalive: KeepAlive::default(),
        }
    }
}

/// Lifecycle phase, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    AwaitingHandshake,
    Ready,
    Closing,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: ShutdownReason,
    /// Audio chunks discarded because the staging buffer was full
    pub dropped_chunks: usize,
}

/// One client conversation with the model.
pub struct LiveSession {
    credentials: Arc<CredentialProvider>,
    connector: Arc<dyn LiveConnector>,
    config: SessionConfig,
}

impl LiveSession {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        connector: Arc<dyn LiveConnector>,
        config: SessionConfig,
    ) -> Self {
        Self {
            credentials,
            connector,
            config,
        }
    }

    /// Drive the session until either side ends it.
    ///
    /// Never fails: every error is reported to the client (when it is still
    /// listening) and reflected in the returned [`SessionOutcome`].
    pub async fn run(self, downstream: Transport) -> SessionOutcome {
        let Transport {
            sink: client_sink,
            stream: client_stream,
        } = downstream;

        let (client_tx, client_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let client_writer =
            tokio::spawn(write_downstream(client_sink, client_rx).instrument(Span::current()));
        let client = ClientChannel { tx: client_tx };

        debug!(phase = ?SessionPhase::Connecting, "Session phase changed");
        let upstream = match self.connect_upstream().await {
            Ok(upstream) => upstream,
            Err(e) => {
                error!("Failed to connect to Gemini: {}", e);
                let mut message = e.to_string();
                if message.is_empty() {
                    message = "Gemini connection failed".to_string();
                }
                if let Err(e) = client.control(ControlMessage::error(message, None)).await {
                    debug!("Could not report connect failure: {}", e);
                }
                close_downstream(client, client_writer).await;
                debug!(phase = ?SessionPhase::Closed, "Session phase changed");
                return SessionOutcome {
                    reason: ShutdownReason::ConnectFailed,
                    dropped_chunks: 0,
                };
            }
        };
        info!("Sent Gemini setup");
        debug!(phase = ?SessionPhase::AwaitingHandshake, "Session phase changed");

        let Transport {
            sink: upstream_sink,
            stream: upstream_stream,
        } = upstream;
        let (upstream_writer, upstream_handle) = UpstreamWriter::spawn(upstream_sink);
        let shutdown = Arc::new(ShutdownSignal::new());
        let gate = Arc::new(StagingGate::default());
        let (ready_tx, ready_rx) = watch::channel(false);

        let mut workers = JoinSet::new();
        workers.spawn(
            forward_client_to_upstream(
                client_stream,
                gate.clone(),
                upstream_writer.clone(),
                shutdown.clone(),
            )
            .instrument(Span::current()),
        );
        workers.spawn(
            forward_upstream_to_client(UpstreamLeg {
                stream: upstream_stream,
                gate: gate.clone(),
                upstream: upstream_writer.clone(),
                client: client.clone(),
                ready: ready_tx,
                shutdown: shutdown.clone(),
                keepalive: self.config.keepalive,
            })
            .instrument(Span::current()),
        );
        workers.spawn(
            watch_handshake(
                ready_rx,
                self.config.setup_timeout,
                client.clone(),
                shutdown.clone(),
            )
            .instrument(Span::current()),
        );

        loop {
            select! {
                _ = shutdown.cancelled() => break,
                joined = workers.join_next() => match joined {
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        error!("Session worker failed: {}", e);
                        shutdown.trigger(ShutdownReason::WorkerFault);
                    }
                    Some(Err(e)) => {
                        error!("Session worker panicked: {}", e);
                        shutdown.trigger(ShutdownReason::WorkerFault);
                    }
                    None => break,
                },
            }
        }

        let reason = shutdown.reason().unwrap_or(ShutdownReason::WorkerFault);
        info!(%reason, phase = ?SessionPhase::Closing, "Closing session");

        workers.shutdown().await;

        upstream_writer.close();
        drop(upstream_writer);
        if timeout(CLOSE_TIMEOUT, upstream_handle).await.is_err() {
            warn!("Timed out closing Gemini socket");
        }
        close_downstream(client, client_writer).await;

        let dropped_chunks = gate.dropped();
        if dropped_chunks > 0 {
            warn!(dropped_chunks, "Audio was dropped while waiting for Gemini setup");
        }
        debug!(phase = ?SessionPhase::Closed, "Session phase changed");

        SessionOutcome {
            reason,
            dropped_chunks,
        }
    }

    /// Obtain a token, open the upstream socket and send setup.
    async fn connect_upstream(&self) -> SessionResult<Transport> {
        let token = self.credentials.get_token().await?;
        info!("Connecting to Gemini WS");
        let mut upstream = self.connector.connect(&token).await?;

        let setup = serde_json::to_string(&ClientEnvelope::setup(&self.config.setup))
            .map_err(LiveError::from)?;
        upstream.sink.send(Frame::Text(setup)).await?;
        Ok(upstream)
    }
}

/// Handle for queueing frames to the client writer.
#[derive(Clone)]
struct ClientChannel {
    tx: mpsc::Sender<DownstreamRoute>,
}

impl ClientChannel {
    async fn control(&self, message: ControlMessage) -> SessionResult<()> {
        self.tx
            .send(DownstreamRoute::Control(message))
            .await
            .map_err(|_| SessionError::DownstreamClosed)
    }

    async fn audio(&self, pcm: Bytes) -> SessionResult<()> {
        self.tx
            .send(DownstreamRoute::Audio(pcm))
            .await
            .map_err(|_| SessionError::DownstreamClosed)
    }
}

/// Queue a close after anything already pending, then wait for the writer.
async fn close_downstream(client: ClientChannel, writer: JoinHandle<()>) {
    match timeout(CLOSE_TIMEOUT, client.tx.send(DownstreamRoute::Close)).await {
        Ok(Ok(())) => {}
        // Writer already exited and closed the socket.
        Ok(Err(_)) => {}
        Err(_) => warn!("Timed out queueing client close"),
    }
    drop(client);

    match timeout(CLOSE_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Client writer task failed: {}", e),
        Err(_) => warn!("Timed out closing client socket"),
    }
}

/// Sole owner of the client sink.
async fn write_downstream(mut sink: FrameSink, mut rx: mpsc::Receiver<DownstreamRoute>) {
    while let Some(route) = rx.recv().await {
        let frame = match route {
            DownstreamRoute::Control(message) => match serde_json::to_string(&message) {
                Ok(json) => Frame::Text(json),
                Err(e) => {
                    error!("Failed to serialize control message: {}", e);
                    continue;
                }
            },
            DownstreamRoute::Audio(pcm) => Frame::Binary(pcm),
            DownstreamRoute::Close => break,
        };

        if let Err(e) = sink.send(frame).await {
            debug!("Client socket write failed: {}", e);
            break;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Error closing client socket: {}", e);
    }
}

async fn forward_client_to_upstream(
    mut client_stream: FrameStream,
    gate: Arc<StagingGate>,
    upstream: UpstreamWriter,
    shutdown: Arc<ShutdownSignal>,
) -> SessionResult<()> {
    loop {
        let frame = select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = client_stream.next() => frame,
        };

        let message = match frame {
            Some(Ok(Frame::Binary(pcm))) => ClientMessage::AudioFrame(pcm),
            Some(Ok(Frame::Text(text))) => match ClientMessage::parse(&text) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring malformed client message: {}", e);
                    continue;
                }
            },
            Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => continue,
            Some(Ok(Frame::Close(_))) | None => {
                info!("Client disconnected");
                shutdown.trigger(ShutdownReason::ClientDisconnected);
                return Ok(());
            }
            Some(Err(e)) => {
                warn!("Client socket error: {}", e);
                shutdown.trigger(ShutdownReason::ClientDisconnected);
                return Ok(());
            }
        };

        match message {
            ClientMessage::AudioFrame(pcm) => {
                if gate.admit(pcm, &upstream)? == Admission::Dropped {
                    debug!("Staging buffer full, dropping audio chunk");
                }
            }
            ClientMessage::Stop => {
                upstream.end_audio_stream()?;
                info!("Client ended audio stream");
                shutdown.trigger(ShutdownReason::ClientStop);
                return Ok(());
            }
            ClientMessage::Other => {}
        }
    }
}

struct UpstreamLeg {
    stream: FrameStream,
    gate: Arc<StagingGate>,
    upstream: UpstreamWriter,
    client: ClientChannel,
    ready: watch::Sender<bool>,
    shutdown: Arc<ShutdownSignal>,
    keepalive: KeepAlive,
}

async fn forward_upstream_to_client(leg: UpstreamLeg) -> SessionResult<()> {
    let UpstreamLeg {
        mut stream,
        gate,
        upstream,
        client,
        ready,
        shutdown,
        keepalive,
    } = leg;

    let mut ping_timer = interval_at(Instant::now() + keepalive.interval, keepalive.interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Set while a ping is outstanding
    let mut pong_deadline: Option<Instant> = None;

    let close = loop {
        let awaiting_pong = pong_deadline.is_some();
        let deadline = pong_deadline.unwrap_or_else(Instant::now);

        let frame = select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = ping_timer.tick(), if !awaiting_pong => {
                upstream.ping()?;
                pong_deadline = Some(Instant::now() + keepalive.timeout);
                continue;
            }
            _ = sleep_until(deadline), if awaiting_pong => {
                warn!("No keep-alive pong from Gemini");
                break CloseInfo::new(CLOSE_INTERNAL_ERROR, "keepalive ping timeout");
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Frame::Text(text))) => {
                let events = match decode_server_message(&text) {
                    Ok(events) => events,
                    Err(e) => {
                        debug!("Dropping malformed Gemini message: {}", e);
                        continue;
                    }
                };
                for event in events {
                    dispatch_event(event, &gate, &upstream, &client, &ready).await?;
                }
            }
            Some(Ok(Frame::Binary(_))) => trace!("Ignoring binary frame from Gemini"),
            Some(Ok(Frame::Pong(_))) => {
                trace!("Gemini keep-alive pong");
                pong_deadline = None;
            }
            Some(Ok(Frame::Ping(_))) => {}
            Some(Ok(Frame::Close(info))) => {
                break info.unwrap_or_else(|| CloseInfo::new(CLOSE_NO_STATUS, ""));
            }
            Some(Err(e)) => break CloseInfo::new(CLOSE_ABNORMAL, e.to_string()),
            None => break CloseInfo::new(CLOSE_ABNORMAL, ""),
        }
    };

    info!(code = close.code, reason = %close.reason, "Gemini WS closed");
    if !shutdown.is_triggered() {
        let message = ControlMessage::error(
            format!("Gemini connection closed ({})", close.code),
            Some(Value::String(close.reason)),
        );
        if let Err(e) = client.control(message).await {
            debug!("Could not report Gemini closure: {}", e);
        }
    }
    shutdown.trigger(ShutdownReason::UpstreamClosed);
    Ok(())
}

async fn dispatch_event(
    event: LiveEvent,
    gate: &StagingGate,
    upstream: &UpstreamWriter,
    client: &ClientChannel,
    ready: &watch::Sender<bool>,
) -> SessionResult<()> {
    match event {
        LiveEvent::SetupComplete => {
            // Later setupComplete markers are ignored.
            if let Some(flushed) = gate.open(upstream)? {
                ready.send_replace(true);
                info!(flushed, phase = ?SessionPhase::Ready, "Gemini setupComplete");
                client.control(ControlMessage::Ready).await?;
            }
        }
        LiveEvent::Error(detail) => {
            error!("Gemini error payload: {}", detail);
            client
                .control(ControlMessage::error("Gemini error", Some(detail)))
                .await?;
        }
        LiveEvent::Interrupted => {
            info!("Gemini interrupted");
            client.control(ControlMessage::Interrupted).await?;
        }
        LiveEvent::AudioData(pcm) => client.audio(pcm).await?,
        LiveEvent::TurnComplete => {
            info!("Gemini turnComplete");
            client.control(ControlMessage::TurnComplete).await?;
        }
    }
    Ok(())
}

async fn watch_handshake(
    mut ready: watch::Receiver<bool>,
    limit: Duration,
    client: ClientChannel,
    shutdown: Arc<ShutdownSignal>,
) -> SessionResult<()> {
    // A dropped sender means the upstream leg ended, which already tripped shutdown.
    let wait = async move { ready.wait_for(|is_ready| *is_ready).await.is_ok() };

    let timed_out = select! {
        _ = shutdown.cancelled() => return Ok(()),
        result = timeout(limit, wait) => result.is_err(),
    };
    if !timed_out {
        return Ok(());
    }

    error!("Gemini setupComplete timeout");
    if !shutdown.is_triggered() {
        if let Err(e) = client
            .control(ControlMessage::error("Gemini setup timeout", None))
            .await
        {
            debug!("Could not report setup timeout: {}", e);
        }
    }
    shutdown.trigger(ShutdownReason::HandshakeTimeout);
    Ok(())
}
