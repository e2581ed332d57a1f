//! Chat connection manager.
//!
//! Keeps one resilient WebSocket session bound to one chat room:
//! - `connect` / `disconnect` drive the connection lifecycle, switching rooms
//!   by tearing the previous connection down completely first
//! - a per-connection task owns the socket, answers keepalive pings and
//!   reconnects with exponential backoff up to an attempt ceiling
//! - inbound frames become [`ChatEvent`]s fanned out to every [`Subscription`]
//! - `send` hands frames to the open socket or drops them with a warning

mod backoff;
mod registry;
mod session;
mod types;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::AuthToken;
use crate::chat::RoomId;
use crate::error::{ChatError, Result};
use crate::metrics::FrameMetrics;
use crate::websocket::{OutboundPayload, Transport, TungsteniteTransport};

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use registry::{ListenerRegistry, SubscriberId, Subscription};
pub use session::AUTH_REJECTED_REASON;
pub use types::{ChatEvent, ConnectionInfo, ConnectionState};

use session::{ConnectionTask, OutboundSlot};

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base WebSocket URL; room and token are appended as query parameters
    pub ws_url: String,
    pub backoff: BackoffConfig,
}

impl ConnectionConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// How long teardown waits for the connection task before aborting it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The connection currently bound to a room
struct ActiveConnection {
    room_id: RoomId,
    cancel: CancellationToken,
    attempts: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl ActiveConnection {
    /// Cancel the task (socket and any pending reconnect timer) and wait for it.
    ///
    /// A task still running after [`SHUTDOWN_TIMEOUT`] is aborted.
    async fn shutdown(mut self) {
        self.cancel.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "Connection task failed to finish");
            }
            Err(_) => {
                tracing::warn!(room_id = %self.room_id, "Connection task did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}

/// Manages the chat socket for one room at a time
pub struct ConnectionManager {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<ListenerRegistry>,
    outbound: OutboundSlot,
    active: Mutex<Option<ActiveConnection>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            registry: Arc::new(ListenerRegistry::new()),
            outbound: Arc::new(RwLock::new(None)),
            active: Mutex::new(None),
        }
    }

    /// Manager using the `tokio-tungstenite` transport
    pub fn with_tungstenite(config: ConnectionConfig) -> Self {
        Self::new(config, Arc::new(TungsteniteTransport::new()))
    }

    /// Bind the manager to `room_id`.
    ///
    /// A no-op when already connecting or connected to the same room.
    /// Otherwise any previous connection is torn down before the new one
    /// starts. Connection failures are reported through events, never here.
    ///
    /// # Errors
    ///
    /// * [`ChatError::InvalidArgument`] for an empty room id or token, or a
    ///   base URL that is not `ws://` / `wss://`
    /// * [`ChatError::Url`] if the base URL cannot be parsed
    pub async fn connect(
        &self,
        room_id: impl Into<RoomId>,
        token: impl Into<AuthToken>,
    ) -> Result<()> {
        let room_id = room_id.into();
        let token = token.into();

        if room_id.is_empty() {
            return Err(ChatError::invalid_argument("room id must not be empty"));
        }
        if token.is_empty() {
            return Err(ChatError::invalid_argument("token must not be empty"));
        }
        let url = build_socket_url(&self.config.ws_url, &room_id, &token)?;

        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.room_id == room_id
                && !current.task.is_finished()
                && self.registry.state().is_active()
            {
                tracing::debug!(room_id = %room_id, "Already connected to room");
                return Ok(());
            }
        }

        if let Some(previous) = active.take() {
            tracing::info!(from = %previous.room_id, to = %room_id, "Replacing chat connection");
            previous.shutdown().await;
        }

        self.registry.transition(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let task = ConnectionTask {
            room_id: room_id.clone(),
            url,
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            outbound: self.outbound.clone(),
            backoff: ExponentialBackoff::with_config(self.config.backoff.clone()),
            attempts: attempts.clone(),
            cancel: cancel.clone(),
        };

        tracing::info!(room_id = %room_id, "Connecting to chat room");
        let handle = tokio::spawn(task.run());

        *active = Some(ActiveConnection {
            room_id,
            cancel,
            attempts,
            task: handle,
        });

        Ok(())
    }

    /// Close the connection on purpose.
    ///
    /// Cancels any pending reconnect, closes the socket with code 1000 and
    /// waits for the connection task to finish. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;

        match active.take() {
            Some(previous) => {
                tracing::info!(room_id = %previous.room_id, "Disconnecting from chat room");
                previous.shutdown().await;
            }
            None => {
                tracing::debug!("Disconnect requested without an active connection");
            }
        }

        *self.outbound.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.registry.transition(ConnectionState::Disconnected);
    }

    /// Send text or a pre-built frame.
    ///
    /// Text is wrapped into a `message:send` frame. Without an open socket
    /// the payload is dropped and a warning is logged; nothing is queued.
    pub fn send(&self, payload: impl Into<OutboundPayload>) {
        let frame = payload.into().into_frame();
        let action = frame.action();

        let outbound = self.outbound.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = outbound.as_ref() else {
            tracing::warn!(action, "Chat socket not open, dropping outbound message");
            FrameMetrics::record_send_dropped();
            return;
        };

        if sender.send(frame).is_err() {
            tracing::warn!(action, "Chat socket closing, dropping outbound message");
            FrameMetrics::record_send_dropped();
        }
    }

    /// Register for events. The first event reflects the current state.
    pub fn subscribe(&self) -> Subscription {
        self.registry.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.registry.state()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }

    /// Snapshot of the current connection, if one exists
    pub async fn connection_info(&self) -> Option<ConnectionInfo> {
        let active = self.active.lock().await;
        active.as_ref().map(|conn| ConnectionInfo {
            room_id: conn.room_id.clone(),
            state: self.registry.state(),
            reconnect_attempts: conn.attempts.load(Ordering::Relaxed),
        })
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().as_ref() {
            active.cancel.cancel();
        }
    }
}

/// `{base}?reportId={room}&token={token}`
pub fn build_socket_url(base: &str, room_id: &RoomId, token: &AuthToken) -> Result<Url> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(ChatError::invalid_argument(format!(
                "unsupported WebSocket scheme '{other}'"
            )))
        }
    }

    url.query_pairs_mut()
        .append_pair("reportId", room_id.as_str())
        .append_pair("token", token.expose());

    Ok(url)
}
