//! Background timers that keep a [`Realm`] honest: peers that stopped
//! pinging get dropped, and messages nobody ever drained get expired.
//! Grounded on the credential-expiry sweep loop of the teacher's TURN
//! server, translated from a dedicated OS thread into a cancellable tokio
//! task — the realm here is already behind async locks.

use crate::message::{Message, MessageKind};
use crate::realm::Realm;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Wraps a spawned sweeper task so it can be stopped deterministically.
/// Dropping the handle without calling [`Self::stop`] leaves the task
/// running — callers that care about a clean shutdown must call it.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Closes and removes any peer whose `idle_for()` exceeds `alive_timeout`.
/// A peer counts as idle from the last heartbeat or inbound frame it sent;
/// see [`crate::realm::Peer::touch`].
pub fn spawn_broken_connection_sweeper(
    realm: Arc<Realm>,
    interval: Duration,
    alive_timeout: Duration,
) -> SweeperHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let stale: Vec<String> = realm
                .all_peers()
                .await
                .into_iter()
                .filter(|p| p.idle_for() > alive_timeout)
                .map(|p| p.id.clone())
                .collect();

            for id in stale {
                if let Some(peer) = realm.remove_peer(&id).await {
                    if let Some(socket) = peer.detach() {
                        socket.close(4001, "idle timeout");
                    }
                }
            }
        }
    });

    SweeperHandle { task }
}

/// Drains destinations whose queue has gone unread for longer than
/// `expire_after`, and — if the destination is currently attached —
/// delivers one `EXPIRE` notice per dropped message, each carrying the
/// original sender's id (spec §4.6). A destination that never reconnects
/// just loses the backlog silently; there is nobody to tell.
pub fn spawn_message_expirer(
    realm: Arc<Realm>,
    interval: Duration,
    expire_after: Duration,
) -> SweeperHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let swept = realm.queue.sweep_expired(expire_after).await;
            for (dst, dropped) in swept {
                if dropped.is_empty() {
                    continue;
                }
                if let Some(peer) = realm.get_peer(&dst).await {
                    if peer.is_attached() {
                        for expired in &dropped {
                            let notice = Message {
                                kind: MessageKind::Expire,
                                src: expired.src.clone(),
                                dst: None,
                                payload: None,
                            };
                            let _ = peer.send(notice.to_json());
                        }
                    }
                }
            }
        }
    });

    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::message::Message;
    use crate::realm::PeerSocket;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSocket {
        sent: Mutex<Vec<String>>,
        closed: AtomicUsize,
    }

    impl FakeSocket {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                closed: AtomicUsize::new(0),
            })
        }
    }

    impl PeerSocket for FakeSocket {
        fn send(&self, text: String) -> Result<(), CoreError> {
            self.sent.lock().push(text);
            Ok(())
        }

        fn close(&self, _code: u16, _reason: &str) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn broken_connection_sweeper_drops_idle_peers() {
        let realm = Arc::new(Realm::default());
        let socket = FakeSocket::new();
        realm.admit("alice", "t1", socket.clone()).await.unwrap();

        let handle = spawn_broken_connection_sweeper(
            realm.clone(),
            Duration::from_millis(5),
            Duration::from_millis(0),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!realm.peer_exists("alice").await);
        assert_eq!(socket.closed.load(Ordering::SeqCst), 1);
        handle.stop();
    }

    #[tokio::test]
    async fn message_expirer_notifies_attached_destination_once_per_dropped_message() {
        let realm = Arc::new(Realm::default());
        let socket = FakeSocket::new();
        realm.admit("bob", "t1", socket.clone()).await.unwrap();
        realm
            .queue
            .enqueue(
                "bob",
                Message {
                    kind: MessageKind::Offer,
                    src: Some("alice".to_string()),
                    dst: Some("bob".to_string()),
                    payload: None,
                },
            )
            .await;
        realm
            .queue
            .enqueue(
                "bob",
                Message {
                    kind: MessageKind::Candidate,
                    src: Some("carol".to_string()),
                    dst: Some("bob".to_string()),
                    payload: None,
                },
            )
            .await;

        let handle = spawn_message_expirer(
            realm.clone(),
            Duration::from_millis(5),
            Duration::from_millis(0),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        let sent = socket.sent.lock();
        let expirations: Vec<&String> = sent.iter().filter(|m| m.contains("EXPIRE")).collect();
        assert_eq!(expirations.len(), 2);
        assert!(expirations.iter().any(|m| m.contains("alice")));
        assert!(expirations.iter().any(|m| m.contains("carol")));
        handle.stop();
    }

    #[tokio::test]
    async fn stop_aborts_the_task() {
        let realm = Arc::new(Realm::default());
        let handle = spawn_broken_connection_sweeper(
            realm,
            Duration::from_millis(5),
            Duration::from_secs(3600),
        );
        handle.stop();
    }
}
