//! Filtered pub/sub fan-out to admin WS/SSE subscribers. A subscriber with
//! a full channel is dropped rather than allowed to stall a publisher —
//! the realm must never block on a slow admin client (spec §5).

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ClientConnected,
    ClientDisconnected,
    MetricsUpdate,
    ErrorOccurred,
    BanAdded,
    BanRemoved,
    AuditEntry,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "client:connected" => Self::ClientConnected,
            "client:disconnected" => Self::ClientDisconnected,
            "metrics:update" => Self::MetricsUpdate,
            "error:occurred" => Self::ErrorOccurred,
            "ban:added" => Self::BanAdded,
            "ban:removed" => Self::BanRemoved,
            "audit:entry" => Self::AuditEntry,
            _ => return None,
        })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientConnected => "client:connected",
            Self::ClientDisconnected => "client:disconnected",
            Self::MetricsUpdate => "metrics:update",
            Self::ErrorOccurred => "error:occurred",
            Self::BanAdded => "ban:added",
            Self::BanRemoved => "ban:removed",
            Self::AuditEntry => "audit:entry",
        }
    }
}

#[derive(Serialize, Clone)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
}

struct Subscriber {
    filter: HashSet<EventKind>,
    tx: tokio::sync::mpsc::Sender<Envelope>,
}

/// A subscriber id, opaque to everything but the bus and the adapter that
/// registered it.
pub type SubscriberId = u64;

pub struct AdminEventBus {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    next_id: std::sync::atomic::AtomicU64,
    channel_capacity: usize,
}

impl AdminEventBus {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
            channel_capacity,
        }
    }

    /// Registers a new subscriber and returns its id plus the receiving
    /// half of its bounded channel.
    pub fn subscribe(&self, events: HashSet<EventKind>) -> (SubscriberId, tokio::sync::mpsc::Receiver<Envelope>) {
        let (tx, rx) = tokio::sync::mpsc::channel(self.channel_capacity);
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.subscribers.write().insert(id, Subscriber { filter: events, tx });
        (id, rx)
    }

    pub fn update_filter(&self, id: SubscriberId, events: HashSet<EventKind>) {
        if let Some(sub) = self.subscribers.write().get_mut(&id) {
            sub.filter = events;
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers `data` to every subscriber whose filter includes `kind`.
    /// A subscriber whose channel is full or closed is dropped silently —
    /// matching "delivery failure deletes the subscriber" (spec §4.10).
    pub fn emit(&self, kind: EventKind, data: Value) {
        let envelope = Envelope {
            kind: kind.as_str(),
            data,
        };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (id, sub) in subscribers.iter() {
                if !sub.filter.contains(&kind) {
                    continue;
                }
                if sub.tx.try_send(envelope.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_only_receives_filtered_events() {
        let bus = AdminEventBus::new(4);
        let (_id, mut rx) = bus.subscribe(HashSet::from([EventKind::BanAdded]));

        bus.emit(EventKind::ClientConnected, serde_json::json!({}));
        bus.emit(EventKind::BanAdded, serde_json::json!({"id": "alice"}));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.kind, "ban:added");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_channel_drops_the_subscriber() {
        let bus = AdminEventBus::new(1);
        let (_id, _rx) = bus.subscribe(HashSet::from([EventKind::MetricsUpdate]));

        bus.emit(EventKind::MetricsUpdate, serde_json::json!({}));
        bus.emit(EventKind::MetricsUpdate, serde_json::json!({}));

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unknown_event_name_fails_to_parse() {
        assert!(EventKind::parse("bogus:event").is_none());
    }
}
