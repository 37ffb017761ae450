//! Counters, gauges, a circular time-series, and the periodic snapshot
//! history built from them. Instrumentation is non-invasive: see
//! [`crate::hooks::RealmHooks`] for how counters get fed without the realm
//! knowing it is being measured.

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

pub struct Gauge {
    value: AtomicI64,
    min: AtomicI64,
    max: AtomicI64,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            value: AtomicI64::new(0),
            min: AtomicI64::new(0),
            max: AtomicI64::new(0),
        }
    }
}

impl Gauge {
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
        self.min.fetch_min(v, Ordering::Relaxed);
        self.max.fetch_max(v, Ordering::Relaxed);
    }

    pub fn incr(&self) {
        let v = self.value.fetch_add(1, Ordering::Relaxed) + 1;
        self.max.fetch_max(v, Ordering::Relaxed);
    }

    pub fn decr(&self) {
        let v = self.value.fetch_sub(1, Ordering::Relaxed) - 1;
        self.min.fetch_min(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
        self.min.store(0, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

/// A fixed-capacity ring of `(timestamp_ms, value)` with O(1) insert and
/// O(n) ordered read.
pub struct CircularTimeSeries {
    capacity: usize,
    entries: Mutex<VecDeque<(u64, f64)>>,
}

impl CircularTimeSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, timestamp_ms: u64, value: f64) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((timestamp_ms, value));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, oldest first.
    pub fn get_all(&self) -> Vec<(u64, f64)> {
        self.entries.lock().iter().copied().collect()
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MemoryStats {
    pub heap_used: u64,
    pub heap_total: u64,
    pub external: u64,
    pub rss: u64,
}

/// A platform-specific memory sampler, installed by the adapter layer. The
/// core falls back to zeroed figures when none is installed (spec §4.7).
pub type MemorySampler = Box<dyn Fn() -> MemoryStats + Send + Sync>;

#[derive(Serialize, Clone)]
pub struct ClientsSnapshot {
    pub total: u64,
    pub connected: i64,
    pub peak: i64,
}

#[derive(Serialize, Clone)]
pub struct MessagesSnapshot {
    pub relayed: u64,
    pub queued: u64,
    pub throughput_per_second: f64,
}

#[derive(Serialize, Clone)]
pub struct RateLimitSnapshot {
    pub hits: u64,
    pub rejections: u64,
}

#[derive(Serialize, Clone)]
pub struct ErrorsSnapshot {
    pub total: u64,
    pub by_type: std::collections::HashMap<String, u64>,
}

/// A dense immutable record captured periodically.
#[derive(Serialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub clients: ClientsSnapshot,
    pub messages: MessagesSnapshot,
    pub rate_limit: RateLimitSnapshot,
    pub errors: ErrorsSnapshot,
    pub memory: MemoryStats,
}

struct ErrorCounters {
    total: Counter,
    by_type: Mutex<AHashMap<String, Counter>>,
}

impl Default for ErrorCounters {
    fn default() -> Self {
        Self {
            total: Counter::default(),
            by_type: Mutex::new(AHashMap::new()),
        }
    }
}

impl ErrorCounters {
    fn incr(&self, kind: &str) {
        self.total.incr();
        let mut map = self.by_type.lock();
        map.entry(kind.to_string()).or_default().incr();
    }

    fn snapshot(&self) -> ErrorsSnapshot {
        let by_type = self
            .by_type
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.get()))
            .collect();
        ErrorsSnapshot {
            total: self.total.get(),
            by_type,
        }
    }

    fn reset(&self) {
        self.total.reset();
        self.by_type.lock().clear();
    }
}

/// Counters, gauges and time-series for one realm, plus the bounded
/// snapshot history built from them on a timer.
pub struct Metrics {
    pub connections_opened: Counter,
    pub connections_closed: Counter,
    pub messages_relayed: Counter,
    pub messages_queued: Counter,
    pub rate_limit_hits: Counter,
    pub rate_limit_rejections: Counter,
    errors: ErrorCounters,

    pub active_connections: Gauge,
    pub queued_messages: Gauge,

    pub throughput: CircularTimeSeries,
    pub latency: CircularTimeSeries,

    history: Mutex<VecDeque<MetricsSnapshot>>,
    max_snapshots: usize,
    retention: Duration,

    last_snapshot_relayed: AtomicU64,
    last_snapshot_at: Mutex<std::time::Instant>,

    sampler: Mutex<Option<MemorySampler>>,
}

impl Metrics {
    pub fn new(series_capacity: usize, max_snapshots: usize, retention: Duration) -> Self {
        Self {
            connections_opened: Counter::default(),
            connections_closed: Counter::default(),
            messages_relayed: Counter::default(),
            messages_queued: Counter::default(),
            rate_limit_hits: Counter::default(),
            rate_limit_rejections: Counter::default(),
            errors: ErrorCounters::default(),
            active_connections: Gauge::default(),
            queued_messages: Gauge::default(),
            throughput: CircularTimeSeries::new(series_capacity),
            latency: CircularTimeSeries::new(series_capacity),
            history: Mutex::new(VecDeque::new()),
            max_snapshots,
            retention,
            last_snapshot_relayed: AtomicU64::new(0),
            last_snapshot_at: Mutex::new(std::time::Instant::now()),
            sampler: Mutex::new(None),
        }
    }

    pub fn set_memory_sampler(&self, sampler: MemorySampler) {
        *self.sampler.lock() = Some(sampler);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors.incr(kind);
    }

    pub fn record_latency_ms(&self, ms: f64) {
        self.latency.push(now_millis(), ms);
    }

    /// Builds and appends a [`MetricsSnapshot`], trimming the history first
    /// by age then by count.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = std::time::Instant::now();
        let mut last_at = self.last_snapshot_at.lock();
        let elapsed = now.saturating_duration_since(*last_at).as_secs_f64().max(1e-6);
        *last_at = now;

        let relayed = self.messages_relayed.get();
        let previous = self.last_snapshot_relayed.swap(relayed, Ordering::Relaxed);
        let throughput = (relayed.saturating_sub(previous)) as f64 / elapsed;
        self.throughput.push(now_millis(), throughput);

        let memory = self
            .sampler
            .lock()
            .as_ref()
            .map(|f| f())
            .unwrap_or_default();

        let snapshot = MetricsSnapshot {
            timestamp: now_millis(),
            clients: ClientsSnapshot {
                total: self.connections_opened.get(),
                connected: self.active_connections.get(),
                peak: self.active_connections.peak(),
            },
            messages: MessagesSnapshot {
                relayed,
                queued: self.messages_queued.get(),
                throughput_per_second: throughput,
            },
            rate_limit: RateLimitSnapshot {
                hits: self.rate_limit_hits.get(),
                rejections: self.rate_limit_rejections.get(),
            },
            errors: self.errors.snapshot(),
            memory,
        };

        let mut history = self.history.lock();
        history.push_back(snapshot.clone());

        let cutoff = now_millis().saturating_sub(self.retention.as_millis() as u64);
        while history.front().is_some_and(|s| s.timestamp < cutoff) {
            history.pop_front();
        }
        while history.len() > self.max_snapshots {
            history.pop_front();
        }

        snapshot
    }

    pub fn history(&self) -> Vec<MetricsSnapshot> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn history_since(&self, start_ms: u64, end_ms: u64) -> Vec<MetricsSnapshot> {
        self.history
            .lock()
            .iter()
            .filter(|s| s.timestamp >= start_ms && s.timestamp <= end_ms)
            .cloned()
            .collect()
    }

    /// Resets every counter, gauge and series to its initial state. History
    /// is preserved; it is a record of what already happened, not live
    /// state.
    pub fn reset(&self) {
        self.connections_opened.reset();
        self.connections_closed.reset();
        self.messages_relayed.reset();
        self.messages_queued.reset();
        self.rate_limit_hits.reset();
        self.rate_limit_rejections.reset();
        self.errors.reset();
        self.active_connections.reset();
        self.queued_messages.reset();
        self.throughput.reset();
        self.latency.reset();
        self.last_snapshot_relayed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_series_caps_at_capacity_and_stays_ordered() {
        let series = CircularTimeSeries::new(3);
        for i in 0..5 {
            series.push(i, i as f64);
        }
        assert_eq!(series.len(), 3);
        let all = series.get_all();
        assert_eq!(all, vec![(2, 2.0), (3, 3.0), (4, 4.0)]);
    }

    #[test]
    fn gauge_tracks_peak_independent_of_current() {
        let gauge = Gauge::default();
        gauge.incr();
        gauge.incr();
        gauge.decr();
        assert_eq!(gauge.get(), 1);
        assert_eq!(gauge.peak(), 2);
    }

    #[test]
    fn reset_zeroes_counters_but_not_history() {
        let metrics = Metrics::new(16, 16, Duration::from_secs(3600));
        metrics.messages_relayed.add(5);
        let snap1 = metrics.snapshot();
        metrics.reset();
        assert_eq!(metrics.messages_relayed.get(), 0);
        assert_eq!(metrics.history().len(), 1);
        assert_eq!(metrics.history()[0].timestamp, snap1.timestamp);
    }

    #[test]
    fn history_is_bounded_by_max_snapshots() {
        let metrics = Metrics::new(16, 2, Duration::from_secs(3600));
        for _ in 0..5 {
            metrics.snapshot();
        }
        assert_eq!(metrics.history().len(), 2);
    }
}
