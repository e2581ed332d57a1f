//! Shared test fixtures: an in-memory transport and message builders

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use report_chat_client::chat::ChatMessage;
use report_chat_client::connection_manager::{BackoffConfig, ConnectionConfig, ConnectionManager};
use report_chat_client::websocket::{Frame, Socket, Transport, TransportError};

pub const WS_URL: &str = "ws://chat.test/ws";

/// How the next `open` call behaves
#[derive(Debug, Clone)]
pub enum OpenScript {
    Accept,
    /// Handshake refused with this HTTP status
    Reject(u16),
    /// Network failure before the handshake
    Fail,
    /// Accepted, but the client's writes never complete
    Stalled,
}

/// Server end of one accepted socket
pub struct ServerSocket {
    pub url: Url,
    to_client: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: fmpsc::UnboundedReceiver<Frame>,
}

impl ServerSocket {
    pub fn send_json(&self, value: Value) {
        self.send_frame(Frame::Text(value.to_string()));
    }

    pub fn send_frame(&self, frame: Frame) {
        let _ = self.to_client.unbounded_send(Ok(frame));
    }

    pub fn close(&self, code: u16) {
        self.send_frame(Frame::close(code, "server close"));
    }

    /// End the stream without a close frame
    pub fn drop_connection(self) {
        drop(self);
    }

    /// Next frame written by the client
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.from_client.next().await
    }

    /// Next client frame, parsed as JSON
    pub async fn next_json(&mut self) -> Value {
        match self.next_frame().await {
            Some(Frame::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("Expected text frame, got {other:?}"),
        }
    }

    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.from_client.try_next().ok().flatten()
    }
}

/// Transport whose sockets are in-memory channels.
///
/// Each accepted socket is handed to the test through the receiver returned
/// by [`FakeTransport::new`]. Once the script is empty every open succeeds.
pub struct FakeTransport {
    script: Mutex<VecDeque<OpenScript>>,
    opens: Mutex<Vec<(Url, Instant)>>,
    servers: mpsc::UnboundedSender<ServerSocket>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSocket>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            opens: Mutex::new(Vec::new()),
            servers,
        });
        (transport, rx)
    }

    pub fn script(&self, steps: impl IntoIterator<Item = OpenScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.opens.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Time between consecutive opens
    pub fn open_gaps(&self) -> Vec<Duration> {
        let opens = self.opens.lock().unwrap();
        opens
            .windows(2)
            .map(|pair| pair[1].1.duration_since(pair[0].1))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &Url) -> Result<Socket, TransportError> {
        self.opens.lock().unwrap().push((url.clone(), Instant::now()));

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OpenScript::Accept);

        let stalled = match step {
            OpenScript::Accept => false,
            OpenScript::Stalled => true,
            OpenScript::Reject(status) => return Err(TransportError::Rejected { status }),
            OpenScript::Fail => return Err(TransportError::Connect("connection refused".into())),
        };

        let (to_client, client_rx) = fmpsc::unbounded();
        let (client_tx, from_client) = fmpsc::unbounded();

        let _ = self.servers.send(ServerSocket {
            url: url.clone(),
            to_client,
            from_client,
        });

        if stalled {
            return Ok(Socket::new(StalledSink, client_rx));
        }
        let sink = client_tx.sink_map_err(|e| TransportError::Socket(e.to_string()));
        Ok(Socket::new(sink, client_rx))
    }
}

/// Sink of a peer that stopped reading: it is never ready and never flushes
struct StalledSink;

impl Sink<Frame> for StalledSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Frame) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }
}

/// Manager over `transport` with a deterministic backoff
pub fn manager(transport: Arc<FakeTransport>, max_attempts: u32) -> Arc<ConnectionManager> {
    let backoff = BackoffConfig {
        base_delay_ms: 1_000,
        max_delay_ms: 30_000,
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts,
    };
    Arc::new(ConnectionManager::new(
        ConnectionConfig::new(WS_URL).with_backoff(backoff),
        transport,
    ))
}

pub fn message_json(id: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "reportId": "r1",
        "senderId": "u1",
        "senderName": "Volunteer",
        "content": format!("message {id}"),
        "type": "text",
        "status": "active",
        "createdAt": created_at
    })
}

pub fn message(id: &str, created_at: &str) -> ChatMessage {
    serde_json::from_value(message_json(id, created_at)).unwrap()
}

pub fn new_message_frame(id: &str, created_at: &str) -> Value {
    json!({ "action": "message:new", "data": message_json(id, created_at) })
}
