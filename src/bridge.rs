//! Single-listener event delivery.
//!
//! The bridge holds at most one listener. Events published while nobody is
//! registered are dropped; there is no queue and no replay. Registering a new
//! listener replaces the previous one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;

/// Event delivered to the foreground consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    /// `true` when the socket reached Open, `false` when it was lost or closed.
    ConnectionStatusChanged {
        #[serde(rename = "isConnected")]
        is_connected: bool,
    },
    /// Inbound frame. Binary frames arrive hex-encoded.
    MessageReceived { message: String },
}

impl Event {
    pub fn status(is_connected: bool) -> Self {
        Event::ConnectionStatusChanged { is_connected }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Event::MessageReceived {
            message: message.into(),
        }
    }
}

/// Receives events from the bridge.
///
/// Called synchronously on the publishing task, so implementations must not
/// block.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

impl EventListener for mpsc::UnboundedSender<Event> {
    fn on_event(&self, event: &Event) {
        if self.send(event.clone()).is_err() {
            tracing::debug!("listener channel closed, event dropped");
        }
    }
}

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Slot = Option<(ListenerId, Arc<dyn EventListener>)>;

/// Shared handle to the listener slot. Clones share the same slot.
#[derive(Clone, Default)]
pub struct EventBridge {
    slot: Arc<RwLock<Slot>>,
    next_id: Arc<AtomicU64>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `listener`, replacing any current one.
    pub fn register(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if let Some((previous, _)) = slot.replace((id, listener)) {
            tracing::debug!(%previous, current = %id, "event listener replaced");
        } else {
            tracing::debug!(current = %id, "event listener registered");
        }
        id
    }

    /// Removes the listener, but only if `id` is still the current one.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some((current, _)) if *current == id => {
                *slot = None;
                tracing::debug!(%id, "event listener unregistered");
                true
            }
            _ => false,
        }
    }

    /// Removes whatever listener is installed.
    pub fn clear(&self) {
        self.slot.write().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn has_listener(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Delivers `event` to the current listener, or drops it.
    pub fn publish(&self, event: Event) {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some((_, listener)) => listener.on_event(&event),
            None => tracing::trace!(?event, "no listener, event dropped"),
        }
    }
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("has_listener", &self.has_listener())
            .finish()
    }
}
