//! Close code handling

/// Normal closure, also used for client-initiated disconnects
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reported when the socket ended without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Server rejected the room id or the token
pub const AUTH_REJECTED: u16 = 4001;

/// What a close means for the reconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Intentional close; stay disconnected
    Normal,
    /// Credentials or parameters rejected; stay disconnected until a new `connect`
    AuthRejected,
    /// Anything else; schedule a reconnect
    Abnormal,
}

impl CloseDisposition {
    /// Classify a close code. A missing code means the socket dropped.
    pub fn from_code(code: Option<u16>) -> Self {
        match code.unwrap_or(ABNORMAL_CLOSURE) {
            NORMAL_CLOSURE => CloseDisposition::Normal,
            AUTH_REJECTED => CloseDisposition::AuthRejected,
            _ => CloseDisposition::Abnormal,
        }
    }

    pub fn should_reconnect(self) -> bool {
        self == CloseDisposition::Abnormal
    }
}
