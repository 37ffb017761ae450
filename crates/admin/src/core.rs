//! The admin façade: binds [`signal_core::Core`] through a narrow
//! capability interface (never its private types, per spec §3) and owns
//! auth, bans, audit, the action layer and the event bus.

use crate::audit::AuditLogger;
use crate::auth::{AuthConfig, AuthManager};
use crate::ban::BanManager;
use crate::events::{AdminEventBus, EventKind};
use crate::actions::Actions;

use parking_lot::Mutex;
use signal_core::hooks::HookId;
use signal_core::Core as RealmCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub auth: AuthConfig,
    pub audit_enabled: bool,
    pub audit_max_entries: usize,
    pub event_channel_capacity: usize,
    pub session_purge_interval: Duration,
    pub snapshot_interval: Duration,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            audit_enabled: true,
            audit_max_entries: 1000,
            event_channel_capacity: 64,
            session_purge_interval: Duration::from_secs(60),
            snapshot_interval: Duration::from_secs(10),
        }
    }
}

/// Bound to exactly one [`signal_core::Core`] for its lifetime. Spec §4.8:
/// "multiple admin cores attaching to the same realm are not supported" —
/// enforced socially here, not with a lock, since attachment is a one-time
/// wiring step done at process startup.
pub struct AdminCore {
    pub realm_core: Arc<RealmCore>,
    pub auth: AuthManager,
    pub bans: Arc<BanManager>,
    pub audit: Arc<AuditLogger>,
    pub events: Arc<AdminEventBus>,
    pub actions: Actions,
    started_at: Instant,
    snapshot_task: Mutex<Option<JoinHandle<()>>>,
    hooks: Mutex<Option<RealmHookHandles>>,
}

/// The three `signal_core::hooks::RealmHooks` registrations `wire_realm_hooks`
/// installs, kept so `detach` can remove exactly these callbacks and leave
/// whatever else (the core's own metrics hooks) registered on the same
/// realm untouched.
struct RealmHookHandles {
    on_connection_opened: HookId,
    on_connection_closed: HookId,
    on_error: HookId,
}

impl AdminCore {
    /// Wires metrics and connection hooks on `realm_core` into the event
    /// bus and starts the session purger and snapshot-publish timer. This
    /// is the Rust shape of "attachToServer" (spec §4.8) — construction and
    /// attachment happen together since we never have an unattached
    /// `AdminCore` in this design.
    pub fn attach(realm_core: Arc<RealmCore>, config: AdminConfig) -> Arc<Self> {
        let bans = Arc::new(BanManager::new());
        let audit = Arc::new(AuditLogger::new(config.audit_enabled, config.audit_max_entries));
        let events = Arc::new(AdminEventBus::new(config.event_channel_capacity));
        let actions = Actions::new(realm_core.realm.clone(), bans.clone(), audit.clone());
        let auth = AuthManager::new(config.auth.clone());
        auth.sessions.start_purger(config.session_purge_interval);

        let admin = Arc::new(Self {
            realm_core: realm_core.clone(),
            auth,
            bans,
            audit,
            events,
            actions,
            started_at: Instant::now(),
            snapshot_task: Mutex::new(None),
            hooks: Mutex::new(None),
        });

        *admin.hooks.lock() = Some(wire_realm_hooks(&realm_core, &admin.events));

        let snapshot_admin = admin.clone();
        let snapshot_interval = config.snapshot_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(snapshot_interval);
            loop {
                ticker.tick().await;
                let snapshot = snapshot_admin.realm_core.metrics.snapshot();
                let value = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
                snapshot_admin.events.emit(EventKind::MetricsUpdate, value);
            }
        });
        *admin.snapshot_task.lock() = Some(task);

        admin
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Detaches from the realm: removes exactly the callbacks `attach`
    /// registered, leaving any other subscriber on the same hooks (the
    /// core's own metrics instrumentation) untouched, and stops every
    /// admin-owned timer. The realm keeps running; only instrumentation and
    /// the control surface go away.
    pub fn detach(&self) {
        if let Some(handles) = self.hooks.lock().take() {
            let realm_hooks = &self.realm_core.realm.hooks;
            realm_hooks.unregister_on_connection_opened(handles.on_connection_opened);
            realm_hooks.unregister_on_connection_closed(handles.on_connection_closed);
            realm_hooks.unregister_on_error(handles.on_error);
        }
        self.auth.sessions.stop_purger();
        if let Some(task) = self.snapshot_task.lock().take() {
            task.abort();
        }
    }

    /// Tears down everything `detach` does, and is additionally idempotent
    /// — a second call is a no-op rather than a panic (spec §5: "destroy()
    /// and stop() are idempotent").
    pub fn destroy(&self) {
        self.detach();
    }
}

fn wire_realm_hooks(realm_core: &Arc<RealmCore>, events: &Arc<AdminEventBus>) -> RealmHookHandles {
    let ev = events.clone();
    let on_connection_opened = realm_core.realm.hooks.register_on_connection_opened(Arc::new(
        move |id: &str| {
            ev.emit(EventKind::ClientConnected, serde_json::json!({ "id": id }));
        },
    ));

    let ev = events.clone();
    let on_connection_closed = realm_core.realm.hooks.register_on_connection_closed(Arc::new(
        move |id: &str| {
            ev.emit(EventKind::ClientDisconnected, serde_json::json!({ "id": id }));
        },
    ));

    let ev = events.clone();
    let on_error = realm_core.realm.hooks.register_on_error(Arc::new(move |kind: &str| {
        ev.emit(EventKind::ErrorOccurred, serde_json::json!({ "kind": kind }));
    }));

    RealmHookHandles {
        on_connection_opened,
        on_connection_closed,
        on_error,
    }
}
