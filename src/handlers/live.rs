//! Voice session WebSocket handler
//!
//! Upgrades `/ws`, adapts the axum socket into a [`Transport`] and runs one
//! [`LiveSession`](crate::core::session::LiveSession) on it under a
//! per-connection tracing span.

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, future};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::core::transport::{CloseInfo, Frame, Transport, TransportError};
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Voice session WebSocket handler
///
/// The upgrade is always accepted; failures after that are reported to the
/// client as `error` control messages before the socket closes.
pub async fn live_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Live WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_live_socket(socket, state))
}

async fn handle_live_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    let span = info_span!("live_session", session_id = %session_id);

    async move {
        info!("Client WebSocket connected");
        let outcome = state.new_session().run(socket_transport(socket)).await;
        info!(
            reason = %outcome.reason,
            dropped_chunks = outcome.dropped_chunks,
            "Live session finished"
        );
    }
    .instrument(span)
    .await
}

/// Adapt an axum server socket.
pub fn socket_transport(socket: WebSocket) -> Transport {
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

    Transport::new(Box::pin(sink), Box::pin(stream))
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: info.code,
            reason: info.reason.into(),
        })),
    }
}

fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(Frame::Binary(data)),
        Message::Close(frame) => Some(Frame::Close(
            frame.map(|frame| CloseInfo::new(frame.code, frame.reason.as_str())),
        )),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
