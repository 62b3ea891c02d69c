//! Capability lifecycle events
//!
//! Events are best-effort: nothing is buffered for late subscribers and a
//! send with no receivers is silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ServiceState, ServiceTarget};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 256;

/// Something happened to a registered capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CapabilityEvent {
    /// A target was registered (or re-registered)
    Registered {
        /// The stored target
        target: ServiceTarget,
    },
    /// A target was removed
    Deregistered {
        /// The removed target
        target: ServiceTarget,
    },
    /// A target pinged
    Ping {
        /// Target id
        id: String,
    },
    /// A target's health changed after a probe
    StateChanged {
        /// Target id
        id: String,
        /// New state
        state: ServiceState,
    },
}

/// Broadcast fan-out of [`CapabilityEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CapabilityEvent>,
}

impl EventBus {
    /// Create a bus with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CapabilityEvent> {
        self.tx.subscribe()
    }

    /// Whether anyone is listening
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Publish an event
    pub fn publish(&self, event: CapabilityEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Dropped capability event: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        assert!(!bus.has_subscribers());
        bus.publish(CapabilityEvent::Ping { id: "x".into() });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        assert!(bus.has_subscribers());

        bus.publish(CapabilityEvent::Ping { id: "x".into() });
        assert_eq!(
            rx.recv().await.unwrap(),
            CapabilityEvent::Ping { id: "x".into() }
        );
    }

    #[test]
    fn test_event_json_shape() {
        let value = serde_json::to_value(CapabilityEvent::Ping { id: "x".into() }).unwrap();
        assert_eq!(value["event"], "ping");
        assert_eq!(value["id"], "x");
    }
}
