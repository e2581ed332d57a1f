//! Per-connection task: handshake, socket pump and reconnect loop

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::chat::RoomId;
use crate::metrics::{ConnectionMetrics, FrameMetrics};
use crate::websocket::close::NORMAL_CLOSURE;
use crate::websocket::transport::FrameSink;
use crate::websocket::{
    CloseDisposition, Frame, InboundFrame, OutboundFrame, Socket, Transport, TransportError,
};

use super::backoff::ExponentialBackoff;
use super::registry::ListenerRegistry;
use super::types::{ChatEvent, ConnectionState};

/// Reason attached to the error event emitted when the server refuses the credentials
pub const AUTH_REJECTED_REASON: &str = "authentication rejected";

/// Upper bound for delivering the close frame to a peer that stopped reading
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Sender half of the open socket's outbound queue, if a socket is open
pub(crate) type OutboundSlot = Arc<RwLock<Option<mpsc::UnboundedSender<OutboundFrame>>>>;

enum SocketOutcome {
    /// `disconnect()` or a room switch closed the socket
    Forced,
    /// The socket ended on its own
    Closed(CloseDisposition),
}

/// Owns the socket of one room for its whole lifetime, including reconnects
pub(crate) struct ConnectionTask {
    pub(crate) room_id: RoomId,
    pub(crate) url: Url,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<ListenerRegistry>,
    pub(crate) outbound: OutboundSlot,
    pub(crate) backoff: ExponentialBackoff,
    pub(crate) attempts: Arc<AtomicU32>,
    pub(crate) cancel: CancellationToken,
}

impl ConnectionTask {
    #[tracing::instrument(name = "chat.connection", skip(self), fields(room_id = %self.room_id))]
    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();

        loop {
            self.registry.transition(ConnectionState::Connecting);
            ConnectionMetrics::record_attempt();
            tracing::debug!(attempt = self.backoff.attempt(), "Opening chat socket");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Cancelling connect");
                    break;
                }
                result = self.transport.open(&self.url) => result,
            };

            let disposition = match opened {
                Ok(socket) => {
                    self.backoff.reset();
                    self.attempts.store(0, Ordering::Relaxed);

                    match self.drive(socket).await {
                        SocketOutcome::Forced => break,
                        SocketOutcome::Closed(disposition) => disposition,
                    }
                }
                Err(e) if e.is_auth_rejection() => {
                    tracing::warn!(error = %e, "Chat handshake rejected");
                    CloseDisposition::AuthRejected
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to open chat socket");
                    CloseDisposition::Abnormal
                }
            };

            self.registry.transition(ConnectionState::Disconnected);

            if !disposition.should_reconnect() {
                if disposition == CloseDisposition::AuthRejected {
                    tracing::warn!("Chat credentials rejected, not reconnecting");
                    self.registry
                        .emit(ChatEvent::Error(AUTH_REJECTED_REASON.to_string()));
                } else {
                    tracing::info!("Chat socket closed normally, not reconnecting");
                }
                break;
            }

            let Some(delay) = self.backoff.next_delay() else {
                tracing::warn!(
                    attempts = self.backoff.attempt(),
                    "Reconnect attempts exhausted, staying disconnected"
                );
                ConnectionMetrics::record_exhausted();
                break;
            };
            self.attempts.store(self.backoff.attempt(), Ordering::Relaxed);
            ConnectionMetrics::record_reconnect_scheduled(delay);

            tracing::info!(
                attempt = self.backoff.attempt(),
                max_attempts = self.backoff.config().max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Cancelling scheduled reconnect");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.registry.transition(ConnectionState::Disconnected);
        tracing::debug!("Connection task finished");
    }

    /// Pump one open socket until it closes
    async fn drive(&mut self, socket: Socket) -> SocketOutcome {
        let Socket {
            mut sink,
            mut stream,
        } = socket;
        let cancel = self.cancel.clone();

        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
        self.set_outbound(Some(tx));
        self.registry.transition(ConnectionState::Connected);
        tracing::info!("Chat socket connected");

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    send_close(&mut sink).await;
                    break SocketOutcome::Forced;
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Frame::Text(text))) => {
                        if let Some(reply) = self.handle_inbound(&text) {
                            match write_or_cancel(&mut sink, &reply, &cancel).await {
                                WriteOutcome::Written => {}
                                WriteOutcome::Cancelled => {
                                    send_close(&mut sink).await;
                                    break SocketOutcome::Forced;
                                }
                                WriteOutcome::Failed(e) => {
                                    tracing::warn!(error = %e, "Failed to answer server frame");
                                    break SocketOutcome::Closed(CloseDisposition::Abnormal);
                                }
                            }
                        }
                    }
                    Some(Ok(Frame::Binary(bytes))) => {
                        tracing::debug!(len = bytes.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Frame::Close(frame))) => {
                        let code = frame.as_ref().map(|f| f.code);
                        tracing::info!(
                            code = ?code,
                            reason = frame.as_ref().map(|f| f.reason.as_str()).unwrap_or(""),
                            "Chat socket closed by server"
                        );
                        break SocketOutcome::Closed(CloseDisposition::from_code(code));
                    }
                    Some(Err(e)) => {
                        // Transport errors surface through the close path only
                        tracing::debug!(error = %e, "Chat socket error");
                        break SocketOutcome::Closed(CloseDisposition::Abnormal);
                    }
                    None => {
                        tracing::debug!("Chat socket stream ended without close frame");
                        break SocketOutcome::Closed(CloseDisposition::Abnormal);
                    }
                },
                Some(frame) = rx.recv() => match write_or_cancel(&mut sink, &frame, &cancel).await {
                    WriteOutcome::Written => {}
                    WriteOutcome::Cancelled => {
                        send_close(&mut sink).await;
                        break SocketOutcome::Forced;
                    }
                    WriteOutcome::Failed(e) => {
                        tracing::warn!(error = %e, action = frame.action(), "Failed to write chat frame");
                        break SocketOutcome::Closed(CloseDisposition::Abnormal);
                    }
                },
            }
        };

        self.set_outbound(None);
        rx.close();
        while let Ok(frame) = rx.try_recv() {
            tracing::warn!(action = frame.action(), "Dropping outbound frame, socket closed");
            FrameMetrics::record_send_dropped();
        }

        outcome
    }

    /// Translate one inbound text frame. Returns the reply to write, if any.
    fn handle_inbound(&self, text: &str) -> Option<OutboundFrame> {
        let frame = match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                FrameMetrics::record_malformed();
                tracing::warn!(error = %e, "Dropping malformed chat frame");
                return None;
            }
        };
        FrameMetrics::record_received(frame.action());

        match frame {
            InboundFrame::Ping => {
                tracing::trace!("Answering keepalive ping");
                Some(OutboundFrame::Pong)
            }
            InboundFrame::MessageNew { data } => {
                tracing::debug!(message_id = %data.id, "Chat message received");
                self.registry.emit(ChatEvent::Message(data));
                None
            }
            InboundFrame::Error { message } => {
                tracing::warn!(message = %message, "Chat server reported an error");
                self.registry.emit(ChatEvent::Error(message));
                None
            }
        }
    }

    fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<OutboundFrame>>) {
        *self.outbound.write().unwrap_or_else(PoisonError::into_inner) = sender;
    }
}

enum WriteOutcome {
    Written,
    /// The connection was cancelled while the peer was not accepting the frame
    Cancelled,
    Failed(TransportError),
}

/// Write `frame` unless the connection is cancelled first
async fn write_or_cancel(
    sink: &mut FrameSink,
    frame: &OutboundFrame,
    cancel: &CancellationToken,
) -> WriteOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => WriteOutcome::Cancelled,
        result = write_frame(sink, frame) => match result {
            Ok(()) => WriteOutcome::Written,
            Err(e) => WriteOutcome::Failed(e),
        },
    }
}

/// Send a normal close frame, giving up after [`CLOSE_TIMEOUT`]
async fn send_close(sink: &mut FrameSink) {
    let close = sink.send(Frame::close(NORMAL_CLOSURE, "client disconnect"));
    match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Failed to send close frame"),
        Err(_) => tracing::warn!(
            timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
            "Peer not accepting close frame, dropping socket"
        ),
    }
}

async fn write_frame(sink: &mut FrameSink, frame: &OutboundFrame) -> Result<(), TransportError> {
    let text = match frame.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, action = frame.action(), "Failed to serialize frame");
            return Ok(());
        }
    };

    sink.send(Frame::Text(text)).await?;
    FrameMetrics::record_sent(frame.action());
    tracing::trace!(action = frame.action(), "Chat frame written");
    Ok(())
}
