//! Explicit hook registration, replacing the "replace a live object's
//! methods" instrumentation pattern (design note, spec §9). Each event
//! fans out to every callback registered on it, so the metrics layer and
//! the admin control plane can both listen on the same realm without one
//! evicting the other; the realm itself never knows either one exists.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type ConnHook = Arc<dyn Fn(&str) + Send + Sync>;
type MessageHook = Arc<dyn Fn(&str, &str) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies one registered callback, returned by a `register_*` call so
/// it can be removed later with `unregister_*` without disturbing any
/// other subscriber on the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(u64);

struct Slot<F> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, F)>>,
}

impl<F> Default for Slot<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<F> Slot<F> {
    fn register(&self, f: F) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, f));
        HookId(id)
    }

    fn unregister(&self, id: HookId) {
        self.callbacks.write().retain(|(existing, _)| *existing != id.0);
    }

    fn clear(&self) {
        self.callbacks.write().clear();
    }
}

pub struct RealmHooks {
    on_connection_opened: Slot<ConnHook>,
    on_connection_closed: Slot<ConnHook>,
    on_message_relayed: Slot<MessageHook>,
    on_message_queued: Slot<MessageHook>,
    on_error: Slot<ErrorHook>,
}

impl Default for RealmHooks {
    fn default() -> Self {
        Self {
            on_connection_opened: Slot::default(),
            on_connection_closed: Slot::default(),
            on_message_relayed: Slot::default(),
            on_message_queued: Slot::default(),
            on_error: Slot::default(),
        }
    }
}

impl RealmHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_on_connection_opened(&self, f: ConnHook) -> HookId {
        self.on_connection_opened.register(f)
    }

    pub fn unregister_on_connection_opened(&self, id: HookId) {
        self.on_connection_opened.unregister(id);
    }

    pub fn register_on_connection_closed(&self, f: ConnHook) -> HookId {
        self.on_connection_closed.register(f)
    }

    pub fn unregister_on_connection_closed(&self, id: HookId) {
        self.on_connection_closed.unregister(id);
    }

    pub fn register_on_message_relayed(&self, f: MessageHook) -> HookId {
        self.on_message_relayed.register(f)
    }

    pub fn unregister_on_message_relayed(&self, id: HookId) {
        self.on_message_relayed.unregister(id);
    }

    pub fn register_on_message_queued(&self, f: MessageHook) -> HookId {
        self.on_message_queued.register(f)
    }

    pub fn unregister_on_message_queued(&self, id: HookId) {
        self.on_message_queued.unregister(id);
    }

    pub fn register_on_error(&self, f: ErrorHook) -> HookId {
        self.on_error.register(f)
    }

    pub fn unregister_on_error(&self, id: HookId) {
        self.on_error.unregister(id);
    }

    pub fn connection_opened(&self, id: &str) {
        for (_, f) in self.on_connection_opened.callbacks.read().iter() {
            f(id);
        }
    }

    pub fn connection_closed(&self, id: &str) {
        for (_, f) in self.on_connection_closed.callbacks.read().iter() {
            f(id);
        }
    }

    pub fn message_relayed(&self, src: &str, dst: &str) {
        for (_, f) in self.on_message_relayed.callbacks.read().iter() {
            f(src, dst);
        }
    }

    pub fn message_queued(&self, src: &str, dst: &str) {
        for (_, f) in self.on_message_queued.callbacks.read().iter() {
            f(src, dst);
        }
    }

    pub fn error(&self, kind: &str) {
        for (_, f) in self.on_error.callbacks.read().iter() {
            f(kind);
        }
    }

    /// Clears every registered callback on every slot. Reserved for full
    /// realm teardown (`Core::shutdown`) — removing one subsystem's own
    /// hooks should go through its `unregister_*` handles instead, so it
    /// never takes another subsystem's callbacks down with it.
    pub fn clear(&self) {
        self.on_connection_opened.clear();
        self.on_connection_closed.clear();
        self.on_message_relayed.clear();
        self.on_message_queued.clear();
        self.on_error.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn two_registrations_on_the_same_slot_both_fire() {
        let hooks = RealmHooks::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let (a2, b2) = (a.clone(), b.clone());
        hooks.register_on_connection_opened(Arc::new(move |_| {
            a2.fetch_add(1, Ordering::Relaxed);
        }));
        hooks.register_on_connection_opened(Arc::new(move |_| {
            b2.fetch_add(1, Ordering::Relaxed);
        }));

        hooks.connection_opened("alice");

        assert_eq!(a.load(Ordering::Relaxed), 1);
        assert_eq!(b.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unregister_removes_only_its_own_callback() {
        let hooks = RealmHooks::new();
        let kept = Arc::new(AtomicUsize::new(0));

        let id = hooks.register_on_error(Arc::new(|_| {}));
        let kept2 = kept.clone();
        hooks.register_on_error(Arc::new(move |_| {
            kept2.fetch_add(1, Ordering::Relaxed);
        }));

        hooks.unregister_on_error(id);
        hooks.error("validation");

        assert_eq!(kept.load(Ordering::Relaxed), 1);
    }
}
