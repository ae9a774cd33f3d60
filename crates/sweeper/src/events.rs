//! Event Bus - what the sweeper did, for whoever cares
//!
//! Design: Type-safe events over a tokio broadcast channel.
//! No dynamic dispatch overhead - use enums, not trait objects.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::sweep::RemovedElement;

/// Why a sweep ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepTrigger {
    /// Called directly
    Manual,
    /// First sweep after activation, on the next frame
    Initial,
    /// Fixed-delay retry after the initial sweep
    FollowUp { delay_ms: u64 },
    /// Ad-bearing mutation batch
    Mutation,
}

/// Sweeper events that can be dispatched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SweepEvent {
    Activated { url: String },
    Swept {
        trigger: SweepTrigger,
        removed: Vec<RemovedElement>,
    },
    WatchStarted,
    WatchStopped,
}

/// Simple event bus using tokio broadcast channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SweepEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: SweepEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SweepEvent::Swept {
            trigger: SweepTrigger::Manual,
            removed: Vec::new(),
        });

        match rx.recv().await {
            Ok(SweepEvent::Swept {
                trigger: SweepTrigger::Manual,
                removed,
            }) => assert!(removed.is_empty()),
            _ => panic!("Expected Swept event"),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new().publish(SweepEvent::WatchStarted);
    }
}
