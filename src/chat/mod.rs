//! Chat domain types

mod types;

pub use types::{ChatMessage, MessageId, MessageKind, MessageStatus, RoomId, Timestamp};
