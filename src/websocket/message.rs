use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, MessageKind};

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum OutboundFrame {
    #[serde(rename = "message:send")]
    SendMessage {
        content: String,
        #[serde(rename = "type")]
        kind: MessageKind,
        /// ISO-8601 client timestamp (UTC, millisecond precision)
        timestamp: String,
    },
    #[serde(rename = "pong")]
    Pong,
}

impl OutboundFrame {
    /// Wrap user text into a `message:send` frame stamped with the current time
    pub fn text(content: impl Into<String>) -> Self {
        Self::SendMessage {
            content: content.into(),
            kind: MessageKind::Text,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Action name, used for logging and metric labels
    pub fn action(&self) -> &'static str {
        match self {
            OutboundFrame::SendMessage { .. } => "message:send",
            OutboundFrame::Pong => "pong",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames sent from server to client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action")]
pub enum InboundFrame {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "message:new")]
    MessageNew { data: ChatMessage },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
}

impl InboundFrame {
    pub fn action(&self) -> &'static str {
        match self {
            InboundFrame::Ping => "ping",
            InboundFrame::MessageNew { .. } => "message:new",
            InboundFrame::Error { .. } => "error",
        }
    }
}

/// Payload accepted by `ConnectionManager::send`
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    /// User-authored text, wrapped into a `message:send` frame
    Text(String),
    /// Pre-built frame, sent as is
    Frame(OutboundFrame),
}

impl OutboundPayload {
    pub fn into_frame(self) -> OutboundFrame {
        match self {
            OutboundPayload::Text(text) => OutboundFrame::text(text),
            OutboundPayload::Frame(frame) => frame,
        }
    }
}

impl From<&str> for OutboundPayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OutboundPayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<OutboundFrame> for OutboundPayload {
    fn from(value: OutboundFrame) -> Self {
        Self::Frame(value)
    }
}
