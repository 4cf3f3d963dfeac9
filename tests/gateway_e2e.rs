//! Gateway End-to-End Tests
//!
//! Runs the real axum server on a random port, pointed at a mock Gemini Live
//! server, and talks to it with a real WebSocket client.

mod mock_gemini;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use live_voice_gateway::{ServerConfig, app, state::AppState};
use mock_gemini::{MockBehavior, MockGemini};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP_TIMEOUT: Duration = Duration::from_secs(3);

async fn start_gateway(upstream_url: String, setup_timeout_seconds: f64) -> SocketAddr {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.gemini_ws_url = upstream_url;
    config.access_token = Some("test-token".to_string());
    config.setup_timeout_seconds = setup_timeout_seconds;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind gateway");
    let addr = listener.local_addr().unwrap();
    let router = app(AppState::new(config));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _response) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to gateway");
    socket
}

/// Next data or close message, skipping pings and pongs
async fn next_message(socket: &mut ClientSocket) -> Option<Message> {
    loop {
        let message = timeout(STEP_TIMEOUT, socket.next())
            .await
            .expect("Timed out waiting for gateway")?;
        match message {
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(message) => return Some(message),
            Err(_) => return None,
        }
    }
}

async fn next_json(socket: &mut ClientSocket) -> Value {
    match next_message(socket).await {
        Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected text message, got {other:?}"),
    }
}

/// Drain until the gateway closes, asserting no further text arrives
async fn expect_quiet_close(socket: &mut ClientSocket) {
    while let Some(message) = next_message(socket).await {
        match message {
            Message::Close(_) => return,
            Message::Text(text) => panic!("Unexpected message before close: {text}"),
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_full_conversation_round_trip() {
    let mut gemini = MockGemini::start(MockBehavior::Echo).await;
    let addr = start_gateway(gemini.url(), 5.0).await;
    let mut client = connect_client(addr).await;

    assert_eq!(next_json(&mut client).await, json!({"type": "ready"}));

    client
        .send(Message::Binary(Bytes::from_static(&[1, 2, 3])))
        .await
        .unwrap();

    match next_message(&mut client).await {
        Some(Message::Binary(data)) => assert_eq!(data.as_ref(), &[1, 2, 3]),
        other => panic!("Expected binary audio, got {other:?}"),
    }
    assert_eq!(next_json(&mut client).await, json!({"type": "turn_complete"}));

    client
        .send(Message::Text(r#"{"type":"stop"}"#.into()))
        .await
        .unwrap();
    expect_quiet_close(&mut client).await;

    let setup = gemini.next_message().await;
    assert_eq!(
        setup["setup"]["model"],
        "models/gemini-2.5-flash-native-audio-preview-12-2025"
    );
    assert_eq!(
        gemini.next_message().await,
        json!({"realtimeInput": {"audio": {"mimeType": "audio/pcm;rate=16000", "data": "AQID"}}})
    );
    assert_eq!(
        gemini.next_message().await,
        json!({"realtimeInput": {"audioStreamEnd": true}})
    );
    assert_eq!(gemini.auth_header().as_deref(), Some("Bearer test-token"));
}

#[tokio::test]
async fn test_rejected_upstream_handshake_reports_error() {
    let gemini = MockGemini::start(MockBehavior::RejectHandshake).await;
    let addr = start_gateway(gemini.url(), 5.0).await;
    let mut client = connect_client(addr).await;

    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert!(
        error["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to connect to Gemini Live"),
        "Unexpected error: {error}"
    );
    expect_quiet_close(&mut client).await;
}

#[tokio::test]
async fn test_silent_upstream_times_out() {
    let gemini = MockGemini::start(MockBehavior::Silent).await;
    let addr = start_gateway(gemini.url(), 0.2).await;
    let mut client = connect_client(addr).await;

    assert_eq!(
        next_json(&mut client).await,
        json!({"type": "error", "message": "Gemini setup timeout"})
    );
    expect_quiet_close(&mut client).await;
}

#[tokio::test]
async fn test_audio_sent_before_ready_is_delivered() {
    let mut gemini = MockGemini::start(MockBehavior::Echo).await;
    let addr = start_gateway(gemini.url(), 5.0).await;
    let mut client = connect_client(addr).await;

    // Sent immediately; staged or forwarded depending on timing, but never lost
    client
        .send(Message::Binary(Bytes::from_static(&[9])))
        .await
        .unwrap();

    assert_eq!(next_json(&mut client).await, json!({"type": "ready"}));

    assert!(gemini.next_message().await.get("setup").is_some());
    assert_eq!(
        gemini.next_message().await["realtimeInput"]["audio"]["data"],
        "CQ=="
    );

    client.close(None).await.unwrap();
}
