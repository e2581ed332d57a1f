//! Chat WebSocket protocol: wire frames, close codes and the socket transport

pub mod close;
mod message;
pub mod transport;

pub use close::CloseDisposition;
pub use message::{InboundFrame, OutboundFrame, OutboundPayload};
pub use transport::{CloseFrame, Frame, Socket, Transport, TransportError, TungsteniteTransport};
