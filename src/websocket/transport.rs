//! Socket transport seam.
//!
//! The connection manager never touches a concrete WebSocket type. It asks a
//! [`Transport`] to open a [`Socket`], which is a boxed sink/stream pair of
//! [`Frame`]s. [`TungsteniteTransport`] is the production implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

/// Errors raised by a transport while opening or driving a socket
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Handshake rejected with HTTP status {status}")]
    Rejected { status: u16 },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Socket error: {0}")]
    Socket(String),
}

impl TransportError {
    /// Whether the handshake was refused because of the credentials
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, TransportError::Rejected { status } if *status == 401 || *status == 403)
    }
}

/// Close frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Frame {
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close(Some(CloseFrame::new(code, reason)))
    }

    /// Convert an incoming tungstenite message, skipping control frames the
    /// protocol layer answers on its own
    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            Message::Binary(bytes) => Some(Frame::Binary(bytes.to_vec())),
            Message::Close(frame) => Some(Frame::Close(frame.map(|f| CloseFrame {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned(),
            }))),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Close(frame) => Message::Close(frame.map(|f| WsCloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.into(),
            })),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open socket, split into its writing and reading halves
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Socket {
    pub fn new<S, T>(sink: S, stream: T) -> Self
    where
        S: Sink<Frame, Error = TransportError> + Send + 'static,
        T: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{Socket}}")
    }
}

/// Opens sockets for the connection manager
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake against `url`
    async fn open(&self, url: &Url) -> Result<Socket, TransportError>;
}

/// WebSocket transport backed by `tokio-tungstenite`
#[derive(Debug, Default, Clone)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &Url) -> Result<Socket, TransportError> {
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(map_connect_error)?;

        tracing::debug!(host = ?url.host_str(), "WebSocket handshake completed");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::Socket(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(Message::from(frame))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(message) => Frame::from_message(message).map(Ok),
                Err(e) => Some(Err(TransportError::Socket(e.to_string()))),
            })
        });

        Ok(Socket::new(sink, stream))
    }
}

fn map_connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            tracing::warn!(status, "WebSocket handshake rejected");
            TransportError::Rejected { status }
        }
        other => TransportError::Connect(other.to_string()),
    }
}
