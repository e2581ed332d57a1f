//! Headless chat view.
//!
//! [`ChatView`] binds one room to a [`ConnectionManager`]: it loads history,
//! follows the event stream and keeps a deduplicated [`Timeline`]. Rendering
//! is left to the caller, which applies the returned [`ViewUpdate`]s.

mod timeline;

use std::sync::Arc;

use crate::auth::{AuthToken, TokenProvider};
use crate::chat::{ChatMessage, MessageId, RoomId};
use crate::connection_manager::{ChatEvent, ConnectionManager, ConnectionState, Subscription};
use crate::error::Result;
use crate::history::HistorySource;

pub use timeline::Timeline;

/// Default number of messages loaded on mount
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Change the renderer should reflect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// History was merged; `count` messages were new
    HistoryLoaded { count: usize },
    MessageAppended(MessageId),
    /// A live message whose id was already shown
    DuplicateIgnored(MessageId),
    Status(ConnectionState),
    Error(String),
}

impl ViewUpdate {
    /// Whether the list should scroll to the newest message
    pub fn scrolls_to_newest(&self) -> bool {
        matches!(
            self,
            ViewUpdate::HistoryLoaded { .. } | ViewUpdate::MessageAppended(_)
        )
    }
}

pub struct ChatView {
    manager: Arc<ConnectionManager>,
    history: Arc<dyn HistorySource>,
    tokens: Arc<dyn TokenProvider>,
    room_id: RoomId,
    history_limit: usize,
    timeline: Timeline,
    status: ConnectionState,
    input: String,
    token: Option<AuthToken>,
    subscription: Option<Subscription>,
    connected_once: bool,
    last_error: Option<String>,
}

impl ChatView {
    pub fn new(
        manager: Arc<ConnectionManager>,
        history: Arc<dyn HistorySource>,
        tokens: Arc<dyn TokenProvider>,
        room_id: impl Into<RoomId>,
    ) -> Self {
        Self {
            manager,
            history,
            tokens,
            room_id: room_id.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            timeline: Timeline::new(),
            status: ConnectionState::Disconnected,
            input: String::new(),
            token: None,
            subscription: None,
            connected_once: false,
            last_error: None,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Load history, subscribe, then connect.
    ///
    /// A failed history load is logged and the view starts empty. Mounting
    /// an already mounted view does nothing.
    ///
    /// # Errors
    ///
    /// Fails if no token is available or the manager rejects the arguments.
    pub async fn mount(&mut self) -> Result<Vec<ViewUpdate>> {
        if self.subscription.is_some() {
            return Ok(Vec::new());
        }

        let token = self.tokens.token().await?;
        let mut updates = Vec::new();

        match self.load_history(&token).await {
            Ok(update) => updates.push(update),
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "Failed to load message history");
            }
        }

        self.subscription = Some(self.manager.subscribe());
        self.token = Some(token.clone());

        if let Err(e) = self.manager.connect(self.room_id.clone(), token).await {
            self.unsubscribe();
            return Err(e);
        }

        Ok(updates)
    }

    /// Wait for the next event and apply it.
    ///
    /// Returns `None` when the view is not mounted or the stream ended.
    pub async fn next_updates(&mut self) -> Option<Vec<ViewUpdate>> {
        let event = self.subscription.as_mut()?.recv().await?;
        Some(self.apply(event).await)
    }

    /// Apply one event to the view state
    pub async fn apply(&mut self, event: ChatEvent) -> Vec<ViewUpdate> {
        match event {
            ChatEvent::Message(message) => {
                let id = message.id.clone();
                if self.timeline.push_live(message) {
                    vec![ViewUpdate::MessageAppended(id)]
                } else {
                    tracing::debug!(message_id = %id, "Ignoring duplicate message");
                    vec![ViewUpdate::DuplicateIgnored(id)]
                }
            }
            ChatEvent::Error(message) => {
                self.last_error = Some(message.clone());
                vec![ViewUpdate::Error(message)]
            }
            ChatEvent::Connected => {
                self.status = ConnectionState::Connected;
                let mut updates = vec![ViewUpdate::Status(ConnectionState::Connected)];
                if self.connected_once {
                    // Messages sent while we were away only exist in history
                    if let Some(update) = self.resync().await {
                        updates.push(update);
                    }
                }
                self.connected_once = true;
                updates
            }
            ChatEvent::Connecting => {
                self.status = ConnectionState::Connecting;
                vec![ViewUpdate::Status(ConnectionState::Connecting)]
            }
            ChatEvent::Disconnected => {
                self.status = ConnectionState::Disconnected;
                vec![ViewUpdate::Status(ConnectionState::Disconnected)]
            }
        }
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Send the trimmed input and clear it without waiting for the echo.
    ///
    /// Returns the sent text, or `None` for blank input.
    pub fn submit(&mut self) -> Option<String> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.manager.send(text.as_str());
        self.input.clear();
        Some(text)
    }

    /// Stop listening and close the connection
    pub async fn unmount(&mut self) {
        self.unsubscribe();
        self.manager.disconnect().await;
        self.status = ConnectionState::Disconnected;
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn status(&self) -> ConnectionState {
        self.status
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Messages to render, deleted ones hidden
    pub fn visible_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.timeline.visible()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    async fn load_history(&mut self, token: &AuthToken) -> Result<ViewUpdate> {
        let messages = self
            .history
            .fetch(&self.room_id, token, self.history_limit)
            .await?;
        let count = self.timeline.merge_history(messages);
        tracing::debug!(room_id = %self.room_id, count, "History merged");
        Ok(ViewUpdate::HistoryLoaded { count })
    }

    async fn resync(&mut self) -> Option<ViewUpdate> {
        let token = self.token.clone()?;
        match self.load_history(&token).await {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "Failed to resync history after reconnect");
                None
            }
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
