//! The change-event bus.
//!
//! Filesystem mutations observed by the watcher are fanned out to all
//! subscribers as typed [`ChangeEvent`]s over a bounded broadcast
//! channel. Delivery is at-least-once within a session: a subscriber
//! that falls behind has its oldest events dropped and sees
//! `resync_needed` on the next delivered event, signalling it should
//! re-list the affected entities. There is no replay across restarts.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default per-subscriber queue capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// A new file appeared.
    Add,
    /// An existing file was rewritten.
    Change,
    /// A file was removed.
    Unlink,
}

/// Event payload fields shared by both event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeData {
    /// What happened.
    pub action: ChangeAction,

    /// The affected file, relative to its root.
    pub file: String,

    /// The project directory the file lives under, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// The entity id, when the index could resolve the path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A change event as published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A memory file changed.
    MemoryChange(ChangeData),
    /// A task file changed.
    TaskChange(ChangeData),
}

impl ChangeEvent {
    /// The shared payload.
    #[must_use]
    pub fn data(&self) -> &ChangeData {
        match self {
            Self::MemoryChange(data) | Self::TaskChange(data) => data,
        }
    }
}

/// An event as seen by one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredEvent {
    /// The event.
    pub event: ChangeEvent,

    /// Set when this subscriber previously overflowed and lost events;
    /// it should re-list affected entities to resynchronize.
    pub resync_needed: bool,
}

/// Pub/sub fan-out for change events.
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to change events from this point on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            behind: false,
        }
    }

    /// Publish an event to all subscribers. Events published while no
    /// subscriber exists are dropped silently.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// One subscriber's view of the bus.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    behind: bool,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// Returns `None` when the bus has been dropped and the backlog is
    /// drained. When this subscriber overflowed, the oldest events are
    /// discarded and the next delivered event carries `resync_needed`.
    pub async fn recv(&mut self) -> Option<DeliveredEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    let resync_needed = std::mem::take(&mut self.behind);
                    return Some(DeliveredEvent {
                        event,
                        resync_needed,
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change-event subscriber fell behind");
                    self.behind = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, for polling consumers.
    pub fn try_recv(&mut self) -> Option<DeliveredEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    let resync_needed = std::mem::take(&mut self.behind);
                    return Some(DeliveredEvent {
                        event,
                        resync_needed,
                    });
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change-event subscriber fell behind");
                    self.behind = true;
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_event(file: &str) -> ChangeEvent {
        ChangeEvent::MemoryChange(ChangeData {
            action: ChangeAction::Change,
            file: file.to_string(),
            project: Some("p1".to_string()),
            id: None,
        })
    }

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(memory_event("p1/a.md"));

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(got_a.event, got_b.event);
        assert!(!got_a.resync_needed);
    }

    #[tokio::test]
    async fn per_subscriber_order_is_preserved() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.publish(memory_event(&format!("p1/{i}.md")));
        }
        for i in 0..5 {
            let delivered = sub.recv().await.unwrap();
            assert_eq!(delivered.event.data().file, format!("p1/{i}.md"));
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_flags_resync() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.publish(memory_event(&format!("p1/{i}.md")));
        }

        // Oldest three were dropped; the first delivered event carries
        // the resync flag.
        let first = sub.recv().await.unwrap();
        assert!(first.resync_needed);
        assert_eq!(first.event.data().file, "p1/3.md");

        let second = sub.recv().await.unwrap();
        assert!(!second.resync_needed);
        assert_eq!(second.event.data().file, "p1/4.md");
    }

    #[tokio::test]
    async fn closed_bus_ends_subscription() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.publish(memory_event("p1/a.md"));
        drop(bus);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn wire_shape_matches_contract() {
        let event = ChangeEvent::TaskChange(ChangeData {
            action: ChangeAction::Add,
            file: "p1/TASK-00001-ship.md".to_string(),
            project: Some("p1".to_string()),
            id: Some("task-1a2b".to_string()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_change");
        assert_eq!(json["data"]["action"], "add");
        assert_eq!(json["data"]["file"], "p1/TASK-00001-ship.md");
        assert_eq!(json["data"]["project"], "p1");
        assert_eq!(json["data"]["id"], "task-1a2b");
    }
}
