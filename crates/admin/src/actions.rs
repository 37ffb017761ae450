//! Composes [`signal_core::Realm`], [`BanManager`] and [`AuditLogger`] into
//! the mutating operations the admin routes actually call. Every mutation
//! takes an `actor_id` so the audit trail is never optional (spec §4.8).

use crate::audit::{AuditEntry, AuditLogger};
use crate::ban::{BanEntry, BanManager};

use signal_core::{CoreError, Message, Realm};
use std::sync::Arc;

pub struct Actions {
    realm: Arc<Realm>,
    bans: Arc<BanManager>,
    audit: Arc<AuditLogger>,
}

pub struct DisconnectResult {
    pub disconnected: bool,
    pub audit_entry: AuditEntry,
}

pub struct BanResult {
    pub ban: BanEntry,
    pub disconnected: bool,
    pub audit_entry: AuditEntry,
}

pub struct BroadcastResult {
    pub recipient_count: usize,
    pub audit_entry: AuditEntry,
}

impl Actions {
    pub fn new(realm: Arc<Realm>, bans: Arc<BanManager>, audit: Arc<AuditLogger>) -> Self {
        Self { realm, bans, audit }
    }

    pub async fn disconnect_client(&self, id: &str, actor_id: &str) -> DisconnectResult {
        let removed = self.realm.remove_peer(id).await;
        let disconnected = removed.is_some();
        if let Some(peer) = removed {
            if let Some(socket) = peer.detach() {
                socket.close(4002, "disconnected by admin");
            }
        }

        let entry = self.audit.log(
            "disconnect_client",
            actor_id,
            Some(serde_json::json!({ "id": id, "disconnected": disconnected })),
        );

        DisconnectResult {
            disconnected,
            audit_entry: entry,
        }
    }

    pub async fn ban_client(&self, id: &str, reason: Option<String>, actor_id: &str) -> BanResult {
        let ban = self.bans.ban_client(id, reason);
        let disconnect = self.disconnect_client(id, actor_id).await;

        let entry = self.audit.log(
            "ban_client",
            actor_id,
            Some(serde_json::json!({ "id": id, "reason": ban.reason })),
        );

        BanResult {
            ban,
            disconnected: disconnect.disconnected,
            audit_entry: entry,
        }
    }

    pub fn unban_client(&self, id: &str, actor_id: &str) -> (bool, AuditEntry) {
        let removed = self.bans.unban_client(id);
        let entry = self.audit.log(
            "unban_client",
            actor_id,
            Some(serde_json::json!({ "id": id })),
        );
        (removed, entry)
    }

    pub fn ban_ip(&self, ip: &str, reason: Option<String>, actor_id: &str) -> (BanEntry, AuditEntry) {
        let ban = self.bans.ban_ip(ip, reason);
        let entry = self.audit.log(
            "ban_ip",
            actor_id,
            Some(serde_json::json!({ "ip": ip, "reason": ban.reason })),
        );
        (ban, entry)
    }

    pub fn unban_ip(&self, ip: &str, actor_id: &str) -> (bool, AuditEntry) {
        let removed = self.bans.unban_ip(ip);
        let entry = self.audit.log(
            "unban_ip",
            actor_id,
            Some(serde_json::json!({ "ip": ip })),
        );
        (removed, entry)
    }

    pub fn clear_bans(&self, actor_id: &str) -> AuditEntry {
        self.bans.clear();
        self.audit.log("clear_bans", actor_id, None)
    }

    pub async fn purge_queue(&self, id: &str, actor_id: &str) -> AuditEntry {
        self.realm.queue.clear(id).await;
        self.audit.log(
            "purge_queue",
            actor_id,
            Some(serde_json::json!({ "id": id })),
        )
    }

    /// Attempts delivery to every currently live peer; counts successes.
    /// A destination whose socket send fails is skipped, not retried — the
    /// message is not enqueued for a broadcast (spec scenario 6).
    pub async fn broadcast_message(&self, msg: &Message, actor_id: &str) -> BroadcastResult {
        let peers = self.realm.all_peers().await;
        let mut recipient_count = 0;
        for peer in peers {
            if peer.is_attached() && peer.send(msg.to_json()).is_ok() {
                recipient_count += 1;
            }
        }

        let entry = self.audit.log(
            "broadcast",
            actor_id,
            Some(serde_json::json!({ "type": msg.kind.as_str(), "recipientCount": recipient_count })),
        );

        BroadcastResult {
            recipient_count,
            audit_entry: entry,
        }
    }

    pub fn reset_metrics_audit(&self, actor_id: &str) -> AuditEntry {
        self.audit.log("reset_metrics", actor_id, None)
    }

    pub fn update_rate_limits_audit(&self, actor_id: &str, details: serde_json::Value) -> AuditEntry {
        self.audit.log("update_rate_limits", actor_id, Some(details))
    }

    pub fn toggle_feature_audit(&self, actor_id: &str, feature: &str, enabled: bool) -> AuditEntry {
        self.audit.log(
            "toggle_feature",
            actor_id,
            Some(serde_json::json!({ "feature": feature, "enabled": enabled })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::{MessageKind, PeerSocket};

    struct Sink(parking_lot::Mutex<Vec<String>>);

    impl Sink {
        fn new() -> Arc<Self> {
            Arc::new(Self(parking_lot::Mutex::new(Vec::new())))
        }
    }

    impl PeerSocket for Sink {
        fn send(&self, text: String) -> Result<(), CoreError> {
            self.0.lock().push(text);
            Ok(())
        }

        fn close(&self, _code: u16, _reason: &str) {}
    }

    fn actions() -> (Arc<Realm>, Actions) {
        let realm = Arc::new(Realm::default());
        let bans = Arc::new(BanManager::new());
        let audit = Arc::new(AuditLogger::new(true, 100));
        let actions = Actions::new(realm.clone(), bans, audit);
        (realm, actions)
    }

    #[tokio::test]
    async fn ban_client_disconnects_and_audits() {
        let (realm, actions) = actions();
        let sink = Sink::new();
        realm.admit("alice", "t1", sink).await.unwrap();

        let result = actions.ban_client("alice", Some("spam".into()), "admin-1").await;
        assert!(result.disconnected);
        assert_eq!(result.audit_entry.action, "ban_client");
        assert!(!realm.peer_exists("alice").await);
    }

    #[tokio::test]
    async fn broadcast_counts_only_attached_recipients() {
        let (realm, actions) = actions();
        let s1 = Sink::new();
        let s2 = Sink::new();
        realm.admit("alice", "t1", s1.clone()).await.unwrap();
        realm.admit("bob", "t2", s2.clone()).await.unwrap();

        let msg = Message::new(MessageKind::Heartbeat);
        let result = actions.broadcast_message(&msg, "admin-1").await;
        assert_eq!(result.recipient_count, 2);
        assert_eq!(s1.0.lock().len(), 1);
        assert_eq!(s2.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_unknown_client_is_not_an_error() {
        let (_realm, actions) = actions();
        let result = actions.disconnect_client("ghost", "admin-1").await;
        assert!(!result.disconnected);
    }
}
