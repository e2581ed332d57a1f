//! Connection state, events and snapshots

use std::fmt;

use serde::Serialize;

use crate::chat::{ChatMessage, RoomId};

/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    /// Status event announcing this state
    pub fn event(self) -> ChatEvent {
        match self {
            ConnectionState::Disconnected => ChatEvent::Disconnected,
            ConnectionState::Connecting => ChatEvent::Connecting,
            ConnectionState::Connected => ChatEvent::Connected,
        }
    }

    /// Whether a socket is open or being opened
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Events delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Connecting,
    Connected,
    Disconnected,
    Message(ChatMessage),
    Error(String),
}

impl ChatEvent {
    /// The state a status event announces, if it is one
    pub fn state(&self) -> Option<ConnectionState> {
        match self {
            ChatEvent::Connecting => Some(ConnectionState::Connecting),
            ChatEvent::Connected => Some(ConnectionState::Connected),
            ChatEvent::Disconnected => Some(ConnectionState::Disconnected),
            ChatEvent::Message(_) | ChatEvent::Error(_) => None,
        }
    }
}

/// Snapshot of the active connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub room_id: RoomId,
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
}
