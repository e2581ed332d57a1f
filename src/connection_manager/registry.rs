//! Listener registry: subscriber fan-out for chat events

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::ConnectionMetrics;

use super::types::{ChatEvent, ConnectionState};

/// Events buffered per subscriber before new ones are dropped for it
pub const SUBSCRIBER_BUFFER_SIZE: usize = 256;

/// Opaque subscriber handle id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct RegistryState {
    state: ConnectionState,
    listeners: HashMap<SubscriberId, mpsc::Sender<ChatEvent>>,
}

/// Holds the connection state together with the subscriber set.
///
/// Both live under one lock so a new subscriber's status event and the
/// events that follow it are consistent with each other.
pub struct ListenerRegistry {
    inner: Mutex<RegistryState>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::with_buffer_size(SUBSCRIBER_BUFFER_SIZE)
    }

    /// Registry whose subscribers each buffer at most `buffer_size` events
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                state: ConnectionState::Disconnected,
                listeners: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber.
    ///
    /// The subscriber immediately receives `Connected` if the connection is
    /// up and `Disconnected` otherwise, before any other event.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer_size);

        let mut inner = self.lock();
        let status = if inner.state == ConnectionState::Connected {
            ChatEvent::Connected
        } else {
            ChatEvent::Disconnected
        };
        // The channel is new and empty, so this cannot fail
        let _ = tx.try_send(status);
        inner.listeners.insert(id, tx);
        let count = inner.listeners.len();
        drop(inner);

        tracing::debug!(subscriber_id = id.0, subscribers = count, "Subscriber registered");

        Subscription {
            id,
            registry: Arc::downgrade(self),
            events: rx,
            active: true,
        }
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.lock().listeners.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = id.0, "Subscriber removed");
        }
        removed
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Move to `state`, announcing it to subscribers.
    ///
    /// Returns false (and emits nothing) when already in that state.
    pub fn transition(&self, state: ConnectionState) -> bool {
        let mut inner = self.lock();
        if inner.state == state {
            return false;
        }
        let previous = inner.state;
        inner.state = state;
        Self::fan_out(&mut inner, state.event());
        drop(inner);

        ConnectionMetrics::record_state(state);
        tracing::debug!(from = %previous, to = %state, "Connection state changed");
        true
    }

    /// Deliver a non-status event to every current subscriber
    pub fn emit(&self, event: ChatEvent) {
        debug_assert!(event.state().is_none(), "status events go through transition");
        let mut inner = self.lock();
        Self::fan_out(&mut inner, event);
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn fan_out(inner: &mut RegistryState, event: ChatEvent) {
        // Subscribers whose receiver is gone are pruned. A full queue means the
        // subscriber stopped reading; it misses this event but stays registered.
        inner.listeners.retain(|id, listener| {
            match listener.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber_id = id.0, "Subscriber queue full, dropping event");
                    ConnectionMetrics::record_event_dropped();
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`.
///
/// Events arrive in emission order. The queue is bounded, so a handle that
/// is kept but never read starts missing events once it fills up.
/// Dropping the handle unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<ListenerRegistry>,
    events: mpsc::Receiver<ChatEvent>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` after `unsubscribe`, or once
    /// the manager is gone and all buffered events were read.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Next buffered event, if any
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.events.try_recv().ok()
    }

    /// Stop receiving events. Calling it again is a no-op.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
        self.events.close();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
