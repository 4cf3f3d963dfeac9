//! WebSocket Mock Server for the Gemini Live API
//!
//! Accepts upstream connections from the gateway, records the bearer header
//! and every JSON message received, and answers according to a
//! [`MockBehavior`].

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Acknowledge setup, answer each audio chunk with the same audio and a turn complete
    Echo,
    /// Accept the socket but never acknowledge setup
    Silent,
    /// Fail the WebSocket handshake with 401
    RejectHandshake,
}

pub struct MockGemini {
    addr: SocketAddr,
    auth_header: Arc<Mutex<Option<String>>>,
    received: mpsc::UnboundedReceiver<Value>,
}

impl MockGemini {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock Gemini");
        let addr = listener.local_addr().unwrap();
        let auth_header = Arc::new(Mutex::new(None));
        let (tx, received) = mpsc::unbounded_channel();

        let slot = auth_header.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let slot = slot.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, behavior, slot, tx).await;
                });
            }
        });

        Self {
            addr,
            auth_header,
            received,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/live", self.addr)
    }

    pub fn auth_header(&self) -> Option<String> {
        self.auth_header.lock().unwrap().clone()
    }

    /// Next JSON message the gateway sent upstream
    pub async fn next_message(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .expect("Timed out waiting for upstream message")
            .expect("Mock Gemini stopped")
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: MockBehavior,
    slot: Arc<Mutex<Option<String>>>,
    tx: mpsc::UnboundedSender<Value>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        *slot.lock().unwrap() = header;

        if behavior == MockBehavior::RejectHandshake {
            let mut error = ErrorResponse::new(Some("unauthorized".to_string()));
            *error.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(error);
        }
        Ok(response)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let value: Value = serde_json::from_str(text.as_str())?;
        let _ = tx.send(value.clone());

        if behavior != MockBehavior::Echo {
            continue;
        }

        if value.get("setup").is_some() {
            let ack = json!({"setupComplete": {}});
            write.send(Message::Text(ack.to_string().into())).await?;
            continue;
        }

        if let Some(data) = value["realtimeInput"]["audio"]["data"].as_str() {
            let content = json!({
                "serverContent": {
                    "modelTurn": {"parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": data}}
                    ]}
                }
            });
            write.send(Message::Text(content.to_string().into())).await?;

            let done = json!({"serverContent": {"turnComplete": true}});
            write.send(Message::Text(done.to_string().into())).await?;
        }
    }

    Ok(())
}
