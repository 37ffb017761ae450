//! One token bucket per peer id. Strictly local to this process — there is
//! no cross-replica coordination, by design (see spec §4.2).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_tokens: f64,
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 20.0,
            refill_rate: 10.0,
        }
    }
}

pub struct RateLimiter {
    config: Mutex<RateLimitConfig>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Mutex::new(config),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_config(&self, config: RateLimitConfig) {
        *self.config.lock() = config;
    }

    pub fn config(&self) -> RateLimitConfig {
        *self.config.lock()
    }

    /// Admits or rejects one message from `id`. Always admits when the
    /// limiter is disabled.
    pub fn try_consume(&self, id: &str) -> bool {
        let config = *self.config.lock();
        if !config.enabled {
            return true;
        }

        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(id.to_string()).or_insert_with(|| Bucket {
            tokens: config.max_tokens,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * config.refill_rate).min(config.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drops the bucket for a final disconnect. Must not be called on a
    /// transient detach, or a reconnecting peer would get a full refill for
    /// free.
    pub fn remove_client(&self, id: &str) {
        self.buckets.lock().remove(id);
    }

    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_burst_then_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_tokens: 5.0,
            refill_rate: 1.0,
        });

        for _ in 0..5 {
            assert!(limiter.try_consume("alice"));
        }
        assert!(!limiter.try_consume("alice"));
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            max_tokens: 1.0,
            refill_rate: 0.0,
        });

        for _ in 0..100 {
            assert!(limiter.try_consume("alice"));
        }
    }

    #[test]
    fn remove_client_resets_bucket() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_tokens: 1.0,
            refill_rate: 0.0,
        });

        assert!(limiter.try_consume("alice"));
        assert!(!limiter.try_consume("alice"));
        limiter.remove_client("alice");
        assert!(limiter.try_consume("alice"));
    }

    #[test]
    fn buckets_are_independent_per_id() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_tokens: 1.0,
            refill_rate: 0.0,
        });

        assert!(limiter.try_consume("alice"));
        assert!(limiter.try_consume("bob"));
        assert!(!limiter.try_consume("alice"));
    }
}
