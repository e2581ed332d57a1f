//! Chat view behavior: history merge, dedup and optimistic sends

mod common;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use common::{manager, message, new_message_frame, FakeTransport, ServerSocket};
use report_chat_client::auth::{AuthToken, StaticTokenProvider};
use report_chat_client::chat::{ChatMessage, MessageId, MessageStatus, RoomId};
use report_chat_client::connection_manager::{ConnectionManager, ConnectionState};
use report_chat_client::error::{ChatError, Result};
use report_chat_client::history::HistorySource;
use report_chat_client::view::{ChatView, ViewUpdate};
use report_chat_client::websocket::Frame;

/// History source answering from a queue of pages; `None` fails the call
#[derive(Default)]
struct FakeHistory {
    pages: Mutex<VecDeque<Option<Vec<ChatMessage>>>>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeHistory {
    fn with_pages(pages: impl IntoIterator<Item = Option<Vec<ChatMessage>>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HistorySource for FakeHistory {
    async fn fetch(
        &self,
        room_id: &RoomId,
        _token: &AuthToken,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        self.calls
            .lock()
            .unwrap()
            .push((room_id.to_string(), limit));
        match self.pages.lock().unwrap().pop_front() {
            Some(Some(page)) => Ok(page),
            Some(None) => Err(ChatError::HistoryStatus { status: 500 }),
            None => Ok(Vec::new()),
        }
    }
}

fn view(manager: Arc<ConnectionManager>, history: Arc<FakeHistory>) -> ChatView {
    ChatView::new(
        manager,
        history,
        Arc::new(StaticTokenProvider::new("t1")),
        "r1",
    )
    .with_history_limit(20)
}

/// Apply events until the view reports `state`
async fn wait_for_status(view: &mut ChatView, state: ConnectionState) -> Vec<ViewUpdate> {
    let mut seen = Vec::new();
    loop {
        let updates = view.next_updates().await.expect("event stream ended");
        let done = updates.contains(&ViewUpdate::Status(state));
        seen.extend(updates);
        if done {
            return seen;
        }
    }
}

/// A mounted view with its server socket.
///
/// Everything is held together so the socket stays open for the whole test.
struct Mounted {
    view: ChatView,
    server: ServerSocket,
    manager: Arc<ConnectionManager>,
    /// Updates returned by `mount`
    updates: Vec<ViewUpdate>,
    // Sockets opened by reconnects wait here
    _servers: mpsc::UnboundedReceiver<ServerSocket>,
}

async fn mounted(history: Arc<FakeHistory>) -> Mounted {
    let (transport, mut servers) = FakeTransport::new();
    let manager = manager(transport, 5);
    let mut view = view(manager.clone(), history);

    let updates = view.mount().await.unwrap();
    let server = servers.recv().await.unwrap();
    wait_for_status(&mut view, ConnectionState::Connected).await;

    Mounted {
        view,
        server,
        manager,
        updates,
        _servers: servers,
    }
}

fn timeline_ids(view: &ChatView) -> Vec<&str> {
    view.timeline()
        .messages()
        .iter()
        .map(|m| m.id.as_str())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_mount_loads_history_then_connects() {
    let history = FakeHistory::with_pages([Some(vec![
        message("2", "2024-05-01T10:00:02Z"),
        message("1", "2024-05-01T10:00:01Z"),
    ])]);

    let m = mounted(history.clone()).await;

    assert_eq!(m.updates, vec![ViewUpdate::HistoryLoaded { count: 2 }]);
    assert!(m.updates[0].scrolls_to_newest());
    assert_eq!(history.calls.lock().unwrap()[0], ("r1".to_string(), 20));

    assert_eq!(timeline_ids(&m.view), vec!["1", "2"]);
    assert_eq!(m.view.status(), ConnectionState::Connected);
    assert_eq!(m.manager.state(), ConnectionState::Connected);
    assert!(m.view.is_mounted());
}

#[tokio::test(start_paused = true)]
async fn test_live_message_already_in_history_is_ignored() {
    let history = FakeHistory::with_pages([Some(vec![message("1", "2024-05-01T10:00:01Z")])]);
    let mut m = mounted(history).await;

    m.server
        .send_json(new_message_frame("1", "2024-05-01T10:00:01Z"));
    let updates = m.view.next_updates().await.unwrap();
    assert_eq!(updates, vec![ViewUpdate::DuplicateIgnored(MessageId::new("1"))]);
    assert!(!updates[0].scrolls_to_newest());

    m.server
        .send_json(new_message_frame("2", "2024-05-01T10:00:05Z"));
    let updates = m.view.next_updates().await.unwrap();
    assert_eq!(updates, vec![ViewUpdate::MessageAppended(MessageId::new("2"))]);
    assert!(updates[0].scrolls_to_newest());

    assert_eq!(timeline_ids(&m.view), vec!["1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resyncs_history_without_duplicates() {
    let history = FakeHistory::with_pages([
        Some(vec![message("1", "2024-05-01T10:00:01Z")]),
        Some(vec![
            message("1", "2024-05-01T10:00:01Z"),
            message("2", "2024-05-01T10:00:02Z"),
            message("3", "2024-05-01T10:00:03Z"),
        ]),
    ]);
    let mut m = mounted(history.clone()).await;

    m.server
        .send_json(new_message_frame("3", "2024-05-01T10:00:03Z"));
    m.view.next_updates().await.unwrap();
    assert_eq!(history.call_count(), 1);

    m.server.close(1011);
    let updates = wait_for_status(&mut m.view, ConnectionState::Connected).await;

    assert!(updates.contains(&ViewUpdate::Status(ConnectionState::Disconnected)));
    assert!(updates.contains(&ViewUpdate::HistoryLoaded { count: 1 }));
    assert_eq!(history.call_count(), 2);
    assert_eq!(timeline_ids(&m.view), vec!["1", "2", "3"]);
}

#[tokio::test(start_paused = true)]
async fn test_submit_sends_trimmed_text_and_clears_input() {
    let mut m = mounted(FakeHistory::empty()).await;

    m.view.set_input("   ");
    assert_eq!(m.view.submit(), None);

    m.view.set_input("  seen near the station  ");
    assert_eq!(m.view.submit().as_deref(), Some("seen near the station"));
    assert_eq!(m.view.input(), "");

    let frame = m.server.next_json().await;
    assert_eq!(frame["action"], "message:send");
    assert_eq!(frame["content"], "seen near the station");

    // Blank input produced no frame
    assert_eq!(m.server.try_next_frame(), None);
}

#[tokio::test(start_paused = true)]
async fn test_history_failure_still_connects() {
    let m = mounted(FakeHistory::with_pages([None])).await;

    assert!(m.updates.is_empty());
    assert!(m.view.timeline().is_empty());
    assert_eq!(m.view.status(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_error_event_is_recorded() {
    let mut m = mounted(FakeHistory::empty()).await;

    m.server
        .send_json(json!({ "action": "error", "message": "rate limited" }));
    let updates = m.view.next_updates().await.unwrap();

    assert_eq!(updates, vec![ViewUpdate::Error("rate limited".into())]);
    assert_eq!(m.view.last_error(), Some("rate limited"));
}

#[tokio::test(start_paused = true)]
async fn test_deleted_messages_are_hidden() {
    let mut deleted = message("2", "2024-05-01T10:00:02Z");
    deleted.status = MessageStatus::Deleted;
    let history = FakeHistory::with_pages([Some(vec![
        message("1", "2024-05-01T10:00:01Z"),
        deleted,
    ])]);
    let m = mounted(history).await;

    let visible: Vec<&str> = m.view.visible_messages().map(|m| m.id.as_str()).collect();
    assert_eq!(visible, vec!["1"]);
    assert_eq!(m.view.timeline().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_disconnects_and_ends_updates() {
    let mut m = mounted(FakeHistory::empty()).await;

    m.view.unmount().await;

    assert!(matches!(m.server.next_frame().await, Some(Frame::Close(_))));
    assert_eq!(m.manager.state(), ConnectionState::Disconnected);
    assert_eq!(m.manager.subscriber_count(), 0);
    assert!(!m.view.is_mounted());
    assert!(m.view.next_updates().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_mount_without_token_fails() {
    let (transport, _servers) = FakeTransport::new();
    let manager = manager(transport.clone(), 5);
    let mut view = ChatView::new(
        manager,
        FakeHistory::empty(),
        Arc::new(StaticTokenProvider::new("")),
        "r1",
    );

    let err = view.mount().await.unwrap_err();
    assert!(err.is_auth());
    assert!(!view.is_mounted());
    assert_eq!(transport.open_count(), 0);
}
