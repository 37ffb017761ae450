//! Append-only bounded ring of administrative actions. When disabled,
//! `log` still synthesizes an entry for the event bus to publish — storage
//! is the only thing that's skipped (spec §4.8).

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: u64,
    pub action: String,
    pub actor_id: String,
    pub details: Option<Value>,
}

pub struct AuditLogger {
    enabled: bool,
    max_entries: usize,
    entries: parking_lot::RwLock<VecDeque<AuditEntry>>,
    next_id: AtomicU64,
}

impl AuditLogger {
    pub fn new(enabled: bool, max_entries: usize) -> Self {
        Self {
            enabled,
            max_entries: max_entries.max(1),
            entries: parking_lot::RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Builds and, if enabled, stores a new entry. Always returns the
    /// entry so the caller can publish it on the admin event bus
    /// regardless of storage mode.
    pub fn log(&self, action: impl Into<String>, actor_id: impl Into<String>, details: Option<Value>) -> AuditEntry {
        let entry = AuditEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: now_millis(),
            action: action.into(),
            actor_id: actor_id.into(),
            details,
        };

        if self.enabled {
            let mut entries = self.entries.write();
            if entries.len() >= self.max_entries {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        entry
    }

    pub fn query(
        &self,
        user: Option<&str>,
        action: Option<&str>,
        start: Option<u64>,
        end: Option<u64>,
        limit: Option<usize>,
    ) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        let mut matched: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| user.is_none_or(|u| e.actor_id == u))
            .filter(|e| action.is_none_or(|a| e.action == a))
            .filter(|e| start.is_none_or(|s| e.timestamp >= s))
            .filter(|e| end.is_none_or(|e2| e.timestamp <= e2))
            .cloned()
            .collect();

        if let Some(limit) = limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_entry_on_overflow() {
        let log = AuditLogger::new(true, 2);
        log.log("a", "alice", None);
        log.log("b", "alice", None);
        log.log("c", "alice", None);
        assert_eq!(log.len(), 2);
        let actions: Vec<_> = log.query(None, None, None, None, None).into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["b", "c"]);
    }

    #[test]
    fn disabled_logger_still_returns_entry_but_stores_nothing() {
        let log = AuditLogger::new(false, 10);
        let entry = log.log("reset_metrics", "admin", None);
        assert_eq!(entry.action, "reset_metrics");
        assert!(log.is_empty());
    }

    #[test]
    fn query_filters_by_user_and_action() {
        let log = AuditLogger::new(true, 10);
        log.log("ban", "alice", None);
        log.log("ban", "bob", None);
        log.log("unban", "alice", None);

        let by_user = log.query(Some("alice"), None, None, None, None);
        assert_eq!(by_user.len(), 2);

        let by_action = log.query(None, Some("ban"), None, None, None);
        assert_eq!(by_action.len(), 2);
    }
}
