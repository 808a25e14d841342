//! Cross-widget events.
//!
//! Accepting a friend request changes who the chat can talk to. Instead of
//! reloading everything, the notification widget publishes
//! [`WidgetEvent::FriendsChanged`] and the chat widget re-fetches its
//! partner list.

use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetEvent {
    FriendsChanged,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WidgetEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Deliver `event` to every current subscriber. No subscribers is fine.
    pub fn publish(&self, event: WidgetEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(?event, receivers, "widget event published");
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.tx.subscribe()
    }
}
