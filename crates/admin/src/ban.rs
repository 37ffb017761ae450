//! Two disjoint ban maps — peer id and IP — sharing no state (spec §3).
//! Enforcement of IP bans is left to the caller: the spec's open question
//! notes the realm never records an IP on a `Peer`, so where bans actually
//! bite is an adapter decision (see [`IpBanEnforcer`]).

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BanKind {
    Peer,
    Ip,
}

#[derive(Debug, Clone, Serialize)]
pub struct BanEntry {
    pub id: String,
    pub kind: BanKind,
    pub reason: Option<String>,
    pub banned_at: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Default)]
pub struct BanManager {
    clients: RwLock<HashMap<String, BanEntry>>,
    ips: RwLock<HashMap<String, BanEntry>>,
}

impl BanManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban_client(&self, id: &str, reason: Option<String>) -> BanEntry {
        let entry = BanEntry {
            id: id.to_string(),
            kind: BanKind::Peer,
            reason,
            banned_at: now_millis(),
        };
        self.clients.write().insert(id.to_string(), entry.clone());
        entry
    }

    pub fn unban_client(&self, id: &str) -> bool {
        self.clients.write().remove(id).is_some()
    }

    pub fn is_client_banned(&self, id: &str) -> bool {
        self.clients.read().contains_key(id)
    }

    pub fn ban_ip(&self, ip: &str, reason: Option<String>) -> BanEntry {
        let entry = BanEntry {
            id: ip.to_string(),
            kind: BanKind::Ip,
            reason,
            banned_at: now_millis(),
        };
        self.ips.write().insert(ip.to_string(), entry.clone());
        entry
    }

    pub fn unban_ip(&self, ip: &str) -> bool {
        self.ips.write().remove(ip).is_some()
    }

    pub fn is_ip_banned(&self, ip: &str) -> bool {
        self.ips.read().contains_key(ip)
    }

    pub fn list_clients(&self) -> Vec<BanEntry> {
        self.clients.read().values().cloned().collect()
    }

    pub fn list_ips(&self) -> Vec<BanEntry> {
        self.ips.read().values().cloned().collect()
    }

    pub fn list_all(&self) -> Vec<BanEntry> {
        self.list_clients().into_iter().chain(self.list_ips()).collect()
    }

    pub fn clear(&self) {
        self.clients.write().clear();
        self.ips.write().clear();
    }
}

/// The adapter-supplied hook that actually turns an IP ban into refused
/// connections. The admin core only records the ban; this is how
/// enforcement gets wired in without the core depending on a transport.
pub trait IpBanEnforcer: Send + Sync {
    fn is_banned(&self, ip: &str) -> bool;
}

impl IpBanEnforcer for BanManager {
    fn is_banned(&self, ip: &str) -> bool {
        self.is_ip_banned(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_then_unban_leaves_list_unchanged() {
        let bans = BanManager::new();
        bans.ban_client("alice", Some("spam".into()));
        assert!(bans.is_client_banned("alice"));
        bans.unban_client("alice");
        assert!(!bans.is_client_banned("alice"));
        assert!(bans.list_clients().is_empty());
    }

    #[test]
    fn client_and_ip_maps_are_independent() {
        let bans = BanManager::new();
        bans.ban_client("alice", None);
        assert!(!bans.is_ip_banned("alice"));
        bans.ban_ip("10.0.0.1", None);
        assert!(!bans.is_client_banned("10.0.0.1"));
    }

    #[test]
    fn clear_empties_both_maps() {
        let bans = BanManager::new();
        bans.ban_client("alice", None);
        bans.ban_ip("10.0.0.1", None);
        bans.clear();
        assert!(bans.list_all().is_empty());
    }
}
