//! Store events for consumers
//!
//! Screens subscribe to learn when state changed or a persist landed,
//! instead of polling. Delivery uses `tokio::sync::broadcast`: emitting never
//! blocks, events are dropped when nobody listens, and a lagging subscriber
//! loses the oldest events first.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<StoreEvent>;

/// What caused a persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistReason {
    /// The debounce window elapsed after the last change
    Debounced,
    /// Out-of-band write after a high-value command
    Forced,
    /// Explicit flush by the owner of the store
    Flush,
}

impl std::fmt::Display for PersistReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistReason::Debounced => write!(f, "debounced"),
            PersistReason::Forced => write!(f, "forced"),
            PersistReason::Flush => write!(f, "flush"),
        }
    }
}

/// Events emitted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Initial load finished; `restored` is false when defaults were kept
    Loaded { restored: bool },

    /// A dispatched action changed the state
    StateChanged { action: String },

    /// A snapshot was written
    Persisted { reason: PersistReason },

    /// A snapshot write failed; state stays in memory
    PersistFailed { reason: PersistReason, error: String },
}

/// Broadcast bus for [`StoreEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before lagging kicks in
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(StoreEvent::Persisted {
            reason: PersistReason::Forced,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::Persisted {
                reason: PersistReason::Forced
            }
        );
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(StoreEvent::Loaded { restored: true });

        assert_eq!(rx1.recv().await.unwrap(), StoreEvent::Loaded { restored: true });
        assert_eq!(rx2.recv().await.unwrap(), StoreEvent::Loaded { restored: true });
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        bus.emit(StoreEvent::StateChanged {
            action: "CLEAR_CART".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = StoreEvent::PersistFailed {
            reason: PersistReason::Debounced,
            error: "disk full".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "persist_failed");
        assert_eq!(json["reason"], "debounced");
        assert_eq!(json["error"], "disk full");
    }
}
