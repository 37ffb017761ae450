//! Peer registry, signaling router, rate limiter, message queue and metrics
//! for one signaling realm. Deliberately ignorant of any wire transport —
//! the adapter binary owns axum/WebSocket plumbing and only ever talks to
//! this crate through [`realm::PeerSocket`] and [`Core`].

pub mod error;
pub mod hooks;
pub mod message;
pub mod metrics;
pub mod queue;
pub mod rate_limiter;
pub mod realm;
pub mod router;
pub mod sweepers;
pub mod validator;

pub use error::CoreError;
pub use message::{Message, MessageKind};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use realm::{AdmitOutcome, Peer, PeerSocket, Realm};
pub use router::{RelayConfig, RouteResult, RouterOutcome, SignalingRouter};

use metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use sweepers::SweeperHandle;

/// Everything the adapter needs for one running realm: the peer registry,
/// its rate limiter, its metrics and the two background sweepers, wired
/// together via [`hooks::RealmHooks`]. Constructing a `Core` does not start
/// network I/O — it only starts the timers.
pub struct Core {
    pub realm: Arc<Realm>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub relay: RelayConfig,
    pub max_message_bytes: usize,
    sweepers: parking_lot::Mutex<Vec<SweeperHandle>>,
}

#[derive(Debug, Clone, Copy)]
pub struct CoreConfig {
    pub max_queue_per_destination: usize,
    pub rate_limit: RateLimitConfig,
    pub relay: RelayConfig,
    pub max_message_bytes: usize,
    pub alive_timeout: Duration,
    pub sweep_interval: Duration,
    pub expire_after: Duration,
    pub metrics_series_capacity: usize,
    pub metrics_max_snapshots: usize,
    pub metrics_retention: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_queue_per_destination: queue::DEFAULT_MAX_PER_DESTINATION,
            rate_limit: RateLimitConfig::default(),
            relay: RelayConfig::default(),
            max_message_bytes: 64 * 1024,
            alive_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            expire_after: Duration::from_secs(300),
            metrics_series_capacity: 288,
            metrics_max_snapshots: 288,
            metrics_retention: Duration::from_secs(24 * 3600),
        }
    }
}

impl Core {
    /// Builds the realm, metrics and rate limiter, and starts the broken-
    /// connection and message-expiry sweepers. Call [`Core::shutdown`] to
    /// stop them before dropping the `Core`.
    pub fn start(config: CoreConfig) -> Self {
        let realm = Arc::new(Realm::new(config.max_queue_per_destination));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let metrics = Arc::new(Metrics::new(
            config.metrics_series_capacity,
            config.metrics_max_snapshots,
            config.metrics_retention,
        ));

        wire_metrics_hooks(&realm, &metrics);

        let sweepers = vec![
            sweepers::spawn_broken_connection_sweeper(
                realm.clone(),
                config.sweep_interval,
                config.alive_timeout,
            ),
            sweepers::spawn_message_expirer(
                realm.clone(),
                config.sweep_interval,
                config.expire_after,
            ),
        ];

        Self {
            realm,
            rate_limiter,
            metrics,
            relay: config.relay,
            max_message_bytes: config.max_message_bytes,
            sweepers: parking_lot::Mutex::new(sweepers),
        }
    }

    /// Routes one inbound frame through the signaling pipeline for `sender`.
    pub async fn handle_message(
        &self,
        sender: &Arc<Peer>,
        raw: &str,
    ) -> Result<RouteResult, CoreError> {
        let result = SignalingRouter::handle_message(
            &self.realm,
            &self.rate_limiter,
            self.relay,
            self.max_message_bytes,
            sender,
            raw,
        )
        .await;

        match &result {
            Ok(r) => match &r.outcome {
                RouterOutcome::Forwarded { .. } => self.metrics.messages_relayed.incr(),
                RouterOutcome::Queued { .. } => self.metrics.messages_queued.incr(),
                RouterOutcome::HeartbeatAck | RouterOutcome::Ignored => {}
            },
            Err(e) => {
                self.metrics.record_error(e.kind_tag());
                if matches!(e, CoreError::RateLimited) {
                    self.metrics.rate_limit_hits.incr();
                    self.metrics.rate_limit_rejections.incr();
                }
            }
        }

        result
    }

    /// Stops every background sweeper. Detaching from the admin control
    /// plane should call this before the `Core` is dropped so no task keeps
    /// running against a realm nobody can see anymore.
    pub fn shutdown(&self) {
        let mut sweepers = self.sweepers.lock();
        for handle in sweepers.drain(..) {
            handle.stop();
        }
        self.realm.hooks.clear();
    }
}

/// Installs the counters that make [`Realm`] activity visible in
/// [`Metrics`], without the realm importing the metrics module itself
/// (the hook-registration pattern of spec §9).
fn wire_metrics_hooks(realm: &Arc<Realm>, metrics: &Arc<Metrics>) {
    let m = metrics.clone();
    realm
        .hooks
        .register_on_connection_opened(Arc::new(move |_id: &str| {
            m.connections_opened.incr();
            m.active_connections.incr();
        }));

    let m = metrics.clone();
    realm
        .hooks
        .register_on_connection_closed(Arc::new(move |_id: &str| {
            m.connections_closed.incr();
            m.active_connections.decr();
        }));

    let m = metrics.clone();
    realm.hooks.register_on_error(Arc::new(move |kind: &str| {
        m.record_error(kind);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError as Err2;

    struct Sink(parking_lot::Mutex<Vec<String>>);

    impl Sink {
        fn new() -> Arc<Self> {
            Arc::new(Self(parking_lot::Mutex::new(Vec::new())))
        }
    }

    impl PeerSocket for Sink {
        fn send(&self, text: String) -> Result<(), Err2> {
            self.0.lock().push(text);
            Ok(())
        }

        fn close(&self, _code: u16, _reason: &str) {}
    }

    #[tokio::test]
    async fn core_start_wires_connection_count_into_metrics() {
        let core = Core::start(CoreConfig::default());
        let sink = Sink::new();
        core.realm.admit("alice", "t1", sink).await.unwrap();
        assert_eq!(core.metrics.connections_opened.get(), 1);
        assert_eq!(core.metrics.active_connections.get(), 1);
        core.shutdown();
    }

    #[tokio::test]
    async fn handle_message_increments_relay_counter() {
        let core = Core::start(CoreConfig::default());
        let alice_sink = Sink::new();
        let bob_sink = Sink::new();
        let alice = core
            .realm
            .admit("alice", "t1", alice_sink)
            .await
            .unwrap()
            .peer()
            .clone();
        core.realm.admit("bob", "t2", bob_sink).await.unwrap();

        core.handle_message(&alice, r#"{"type":"OFFER","dst":"bob","payload":{}}"#)
            .await
            .unwrap();

        assert_eq!(core.metrics.messages_relayed.get(), 1);
        core.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_sweepers_and_clears_hooks() {
        let core = Core::start(CoreConfig::default());
        core.shutdown();
        // A second shutdown must not panic on an already-drained sweeper list.
        core.shutdown();
    }

    #[tokio::test]
    async fn oversize_relay_payload_counts_against_errors_by_type() {
        let mut config = CoreConfig::default();
        config.relay = crate::RelayConfig {
            enabled: true,
            max_message_size: 16,
        };
        let core = Core::start(config);
        let alice_sink = Sink::new();
        let alice = core
            .realm
            .admit("alice", "t1", alice_sink)
            .await
            .unwrap()
            .peer()
            .clone();

        let raw = r#"{"type":"RELAY","dst":"bob","payload":{"connectionId":"c1","data":"way too much data"}}"#;
        core.handle_message(&alice, raw).await.unwrap();

        let snapshot = core.metrics.snapshot();
        assert_eq!(snapshot.errors.by_type.get("relay_oversize"), Some(&1));
        core.shutdown();
    }
}
