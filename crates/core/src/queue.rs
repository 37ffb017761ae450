//! Per-destination FIFO of undeliverable messages. The spec sets no hard
//! cap; we adopt the recommended 100-per-destination bound and drop the
//! oldest entry on overflow (open question, spec §9).

use crate::message::Message;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tokio::sync::RwLock;

pub const DEFAULT_MAX_PER_DESTINATION: usize = 100;

struct Entry {
    messages: VecDeque<Message>,
    last_read_at: Instant,
}

/// Returned by [`MessageQueue::enqueue`] so callers can count a
/// `queue_overflow` error when the oldest pending message was dropped to
/// make room.
pub struct EnqueueOutcome {
    pub dropped_oldest: bool,
}

pub struct MessageQueue {
    max_per_destination: usize,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MessageQueue {
    pub fn new(max_per_destination: usize) -> Self {
        Self {
            max_per_destination,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn enqueue(&self, dst: &str, msg: Message) -> EnqueueOutcome {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(dst.to_string()).or_insert_with(|| Entry {
            messages: VecDeque::new(),
            last_read_at: Instant::now(),
        });

        let mut dropped_oldest = false;
        if entry.messages.len() >= self.max_per_destination {
            entry.messages.pop_front();
            dropped_oldest = true;
        }

        entry.messages.push_back(msg);
        EnqueueOutcome { dropped_oldest }
    }

    /// Returns and clears the pending messages for `dst`, refreshing its
    /// `last_read_at` timestamp.
    pub async fn drain(&self, dst: &str) -> Vec<Message> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(dst) {
            Some(entry) => {
                entry.last_read_at = Instant::now();
                entry.messages.drain(..).collect()
            }
            None => {
                entries.insert(
                    dst.to_string(),
                    Entry {
                        messages: VecDeque::new(),
                        last_read_at: Instant::now(),
                    },
                );
                Vec::new()
            }
        }
    }

    pub async fn get_last_read_at(&self, dst: &str) -> Option<Instant> {
        self.entries.read().await.get(dst).map(|e| e.last_read_at)
    }

    pub async fn clear(&self, dst: &str) {
        self.entries.write().await.remove(dst);
    }

    pub async fn len(&self, dst: &str) -> usize {
        self.entries
            .read()
            .await
            .get(dst)
            .map(|e| e.messages.len())
            .unwrap_or(0)
    }

    /// Destinations whose `last_read_at` is older than `expire_after`,
    /// paired with their drained messages. Used by the message expirer.
    pub async fn sweep_expired(
        &self,
        expire_after: std::time::Duration,
    ) -> Vec<(String, Vec<Message>)> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut swept = Vec::new();

        entries.retain(|dst, entry| {
            if entry.messages.is_empty() {
                return true;
            }

            if now.saturating_duration_since(entry.last_read_at) > expire_after {
                swept.push((dst.clone(), entry.messages.drain(..).collect()));
            }

            true
        });

        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn msg() -> Message {
        Message::new(MessageKind::Offer)
    }

    #[tokio::test]
    async fn drain_returns_in_enqueue_order() {
        let q = MessageQueue::new(DEFAULT_MAX_PER_DESTINATION);
        for _ in 0..3 {
            q.enqueue("bob", msg()).await;
        }
        assert_eq!(q.drain("bob").await.len(), 3);
        assert_eq!(q.drain("bob").await.len(), 0);
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let q = MessageQueue::new(2);
        assert!(!q.enqueue("bob", msg()).await.dropped_oldest);
        assert!(!q.enqueue("bob", msg()).await.dropped_oldest);
        assert!(q.enqueue("bob", msg()).await.dropped_oldest);
        assert_eq!(q.len("bob").await, 2);
    }

    #[tokio::test]
    async fn sweep_expired_only_touches_stale_destinations() {
        let q = MessageQueue::new(DEFAULT_MAX_PER_DESTINATION);
        q.enqueue("bob", msg()).await;
        let swept = q.sweep_expired(std::time::Duration::from_secs(0)).await;
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].0, "bob");
        assert_eq!(q.len("bob").await, 0);
    }
}
