//! The registry of live peers. Owns [`MessageQueue`] and id generation.
//! This is the state hub every other component reaches through.

use crate::error::CoreError;
use crate::hooks::RealmHooks;
use crate::queue::MessageQueue;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex as SyncMutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A send/close capability bound to a real socket. The realm never depends
/// on a concrete transport; the adapter layer supplies the implementation.
pub trait PeerSocket: Send + Sync {
    fn send(&self, text: String) -> Result<(), CoreError>;
    fn close(&self, code: u16, reason: &str);
}

pub struct Peer {
    pub id: String,
    pub token: String,
    socket: SyncMutex<Option<Arc<dyn PeerSocket>>>,
    last_ping: SyncMutex<Instant>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("attached", &self.socket.lock().is_some())
            .field("last_ping", &*self.last_ping.lock())
            .finish()
    }
}

impl Peer {
    fn new(id: String, token: String, socket: Arc<dyn PeerSocket>) -> Self {
        Self {
            id,
            token,
            socket: SyncMutex::new(Some(socket)),
            last_ping: SyncMutex::new(Instant::now()),
        }
    }

    /// Sends a frame if the peer currently has a bound socket. Absence of a
    /// socket (a detached peer awaiting reconnect) is not an error — the
    /// caller should fall back to the message queue.
    pub fn send(&self, text: String) -> Result<(), CoreError> {
        match self.socket.lock().as_ref() {
            Some(socket) => socket.send(text),
            None => Err(CoreError::SendFailed("peer detached".into())),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.socket.lock().is_some()
    }

    pub fn rebind(&self, socket: Arc<dyn PeerSocket>) {
        *self.socket.lock() = Some(socket);
    }

    pub fn detach(&self) -> Option<Arc<dyn PeerSocket>> {
        self.socket.lock().take()
    }

    /// Detaches only if `socket` is still the bound one. A stale connection
    /// that lost a reconnect race must not rip out the socket that
    /// superseded it when its own read loop finally ends.
    pub fn detach_if_current(&self, socket: &Arc<dyn PeerSocket>) -> bool {
        let mut guard = self.socket.lock();
        match guard.as_ref() {
            Some(current) if Arc::ptr_eq(current, socket) => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    pub fn touch(&self) {
        *self.last_ping.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_ping.lock().elapsed()
    }
}

/// The outcome of [`Realm::admit`].
#[derive(Debug)]
pub enum AdmitOutcome {
    /// A brand new peer was registered.
    Created(Arc<Peer>),
    /// An existing detached/live peer with a matching token was rebound to
    /// the new socket.
    Reconnected(Arc<Peer>),
}

impl AdmitOutcome {
    pub fn peer(&self) -> &Arc<Peer> {
        match self {
            Self::Created(p) | Self::Reconnected(p) => p,
        }
    }
}

pub struct Realm {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
    pub queue: MessageQueue,
    pub hooks: RealmHooks,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new(crate::queue::DEFAULT_MAX_PER_DESTINATION)
    }
}

impl Realm {
    pub fn new(max_queue_per_destination: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            queue: MessageQueue::new(max_queue_per_destination),
            hooks: RealmHooks::new(),
        }
    }

    /// A cryptographically random 12-byte base64url id, retried on the
    /// vanishingly unlikely chance of a live collision. `Math.random`-style
    /// generators are forbidden — ids double as addressing tokens.
    pub async fn generate_id(&self) -> String {
        loop {
            let mut bytes = [0u8; 12];
            rand::rng().fill_bytes(&mut bytes);
            let candidate = URL_SAFE_NO_PAD.encode(bytes);
            if !self.peer_exists(&candidate).await {
                return candidate;
            }
        }
    }

    /// Admits `(id, token)` bound to `socket`. Accepts a second connection
    /// for an id already live only if the presented token matches; in that
    /// case the existing peer's socket is rebound (any previous socket is
    /// closed as superseded). Otherwise rejects with `IdTaken`.
    pub async fn admit(
        &self,
        id: &str,
        token: &str,
        socket: Arc<dyn PeerSocket>,
    ) -> Result<AdmitOutcome, CoreError> {
        let mut peers = self.peers.write().await;

        if let Some(existing) = peers.get(id) {
            if existing.token != token {
                return Err(CoreError::IdTaken);
            }

            if let Some(old) = existing.detach() {
                old.close(4000, "superseded by reconnect");
            }

            existing.rebind(socket);
            existing.touch();
            self.hooks.connection_opened(id);
            return Ok(AdmitOutcome::Reconnected(existing.clone()));
        }

        let peer = Arc::new(Peer::new(id.to_string(), token.to_string(), socket));
        peers.insert(id.to_string(), peer.clone());
        self.hooks.connection_opened(id);
        Ok(AdmitOutcome::Created(peer))
    }

    pub async fn set_peer(&self, peer: Arc<Peer>) {
        self.peers.write().await.insert(peer.id.clone(), peer);
    }

    pub async fn get_peer(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.read().await.get(id).cloned()
    }

    pub async fn peer_exists(&self, id: &str) -> bool {
        self.peers.read().await.contains_key(id)
    }

    /// Removes a peer outright (not a detach). Used by the broken-connection
    /// sweeper and by admin-initiated disconnects.
    pub async fn remove_peer(&self, id: &str) -> Option<Arc<Peer>> {
        let removed = self.peers.write().await.remove(id);
        if removed.is_some() {
            self.hooks.connection_closed(id);
        }
        removed
    }

    pub async fn get_peer_ids(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn all_peers(&self) -> Vec<Arc<Peer>> {
        self.peers.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSocket {
        sent: SyncMutex<Vec<String>>,
        closed: AtomicUsize,
    }

    impl FakeSocket {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: SyncMutex::new(Vec::new()),
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
    async fn generated_ids_are_not_live() {
        let realm = Realm::default();
        let id = realm.generate_id().await;
        assert!(!realm.peer_exists(&id).await);
    }

    #[tokio::test]
    async fn second_admit_with_matching_token_rebinds() {
        let realm = Realm::default();
        let s1 = FakeSocket::new();
        realm.admit("alice", "t1", s1.clone()).await.unwrap();

        let s2 = FakeSocket::new();
        let outcome = realm.admit("alice", "t1", s2).await.unwrap();
        assert!(matches!(outcome, AdmitOutcome::Reconnected(_)));
        assert_eq!(s1.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_admit_with_wrong_token_is_rejected() {
        let realm = Realm::default();
        let s1 = FakeSocket::new();
        realm.admit("alice", "t1", s1).await.unwrap();

        let s2 = FakeSocket::new();
        let err = realm.admit("alice", "t2", s2).await.unwrap_err();
        assert!(matches!(err, CoreError::IdTaken));
    }

    #[tokio::test]
    async fn detach_if_current_ignores_a_superseded_socket() {
        let realm = Realm::default();
        let s1 = FakeSocket::new();
        let peer = realm.admit("alice", "t1", s1.clone()).await.unwrap().peer().clone();

        let s2 = FakeSocket::new();
        realm.admit("alice", "t1", s2.clone()).await.unwrap();

        assert!(!peer.detach_if_current(&(s1 as Arc<dyn PeerSocket>)));
        assert!(peer.is_attached());
        assert!(peer.detach_if_current(&(s2 as Arc<dyn PeerSocket>)));
        assert!(!peer.is_attached());
    }

    #[tokio::test]
    async fn remove_peer_drops_it_from_the_registry() {
        let realm = Realm::default();
        let socket = FakeSocket::new();
        realm.admit("alice", "t1", socket).await.unwrap();
        assert!(realm.remove_peer("alice").await.is_some());
        assert!(!realm.peer_exists("alice").await);
    }
}
