//! Transport-agnostic WebSocket frames.
//!
//! Both socket legs of a session are adapted into a boxed [`FrameSink`] and
//! [`FrameStream`] pair so the session logic never depends on a concrete
//! WebSocket library. Incoming pings are answered by the underlying library
//! and never surface here; pongs do, so a keep-alive can observe them.

use std::pin::Pin;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Close status used when a connection ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close status used when a close frame carries no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close status for an unexpected server-side condition, including a missed keep-alive pong.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Close code and reason reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A single data, keep-alive or close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseInfo>),
}

/// Failure reading from or writing to a socket.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Both halves of one socket.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }

    /// Adapt a `tokio-tungstenite` client or server socket.
    pub fn from_tungstenite<S>(socket: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame_to_message(frame))));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(message) => message_to_frame(message).map(Ok),
                Err(e) => Some(Err(TransportError(e.to_string()))),
            })
        });

        Self::new(Box::pin(sink), Box::pin(stream))
    }

    /// Two transports wired back to back: frames sent on one arrive on the other.
    ///
    /// Closing a sink ends the peer's stream.
    pub fn in_memory_pair() -> (Transport, Transport) {
        let (left_tx, left_rx) = mpsc::unbounded::<Frame>();
        let (right_tx, right_rx) = mpsc::unbounded::<Frame>();
        (
            Self::from_channel(left_tx, right_rx),
            Self::from_channel(right_tx, left_rx),
        )
    }

    fn from_channel(tx: mpsc::UnboundedSender<Frame>, rx: mpsc::UnboundedReceiver<Frame>) -> Self {
        let sink = tx.sink_map_err(|e| TransportError(e.to_string()));
        let stream = rx.map(Ok::<Frame, TransportError>);
        Self::new(Box::pin(sink), Box::pin(stream))
    }
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: CloseCode::from(info.code),
            reason: info.reason.into(),
        })),
    }
}

fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(Frame::Binary(data)),
        Message::Close(frame) => Some(Frame::Close(frame.map(|frame| {
            CloseInfo::new(u16::from(frame.code), frame.reason.as_str())
        }))),
        Message::Pong(data) => Some(Frame::Pong(data)),
        Message::Ping(_) | Message::Frame(_) => None,
    }
}
