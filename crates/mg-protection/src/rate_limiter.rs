//! Per-key token bucket.
//!
//! # Invariants
//!
//! - `0 <= tokens <= capacity` at all times.
//! - Refill is continuous: `elapsed * refill_per_sec`, capped at capacity.
//! - Buckets for different keys never interact.
//! - Only token consumption changes a bucket. Action outcomes do not.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::RateLimitConfig;

// ---------------------------------------------------------------------------
// TokenBucket
// ---------------------------------------------------------------------------

/// Bucket arithmetic. Pure: the caller supplies `now`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(cfg: RateLimitConfig, now: Instant) -> Self {
        let capacity = f64::from(cfg.capacity);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: cfg.refill_per_sec,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        // saturating_duration_since: a `now` older than last_refill adds nothing.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Refill, then take one token if available.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token will be available (zero if one already is).
    pub fn retry_after(&self) -> Duration {
        let missing = 1.0 - self.tokens;
        if missing <= 0.0 {
            Duration::ZERO
        } else {
            // A slow enough refill rate does not fit in a Duration.
            Duration::try_from_secs_f64(missing / self.refill_per_sec).unwrap_or(Duration::MAX)
        }
    }

    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

struct Inner<K> {
    default_config: RateLimitConfig,
    configs: HashMap<K, RateLimitConfig>,
    buckets: HashMap<K, TokenBucket>,
}

impl<K: Eq + Hash + Clone> Inner<K> {
    fn config_for(&self, key: &K) -> RateLimitConfig {
        self.configs.get(key).copied().unwrap_or(self.default_config)
    }

    fn bucket(&mut self, key: &K, now: Instant) -> &mut TokenBucket {
        let cfg = self.config_for(key);
        self.buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucket::new(cfg, now))
    }
}

/// Token-bucket admission control keyed by `K`.
///
/// Buckets are created full on first use of a key. All access is serialized
/// through an internal mutex; concurrent calls for the same key observe a
/// monotonic token count.
pub struct RateLimiter<K> {
    inner: Mutex<Inner<K>>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// `default_config` applies to every key without an explicit config.
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                default_config,
                configs: HashMap::new(),
                buckets: HashMap::new(),
            }),
        }
    }

    /// Like [`RateLimiter::new`] with explicit per-key configs.
    pub fn with_configs(
        default_config: RateLimitConfig,
        configs: impl IntoIterator<Item = (K, RateLimitConfig)>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                default_config,
                configs: configs.into_iter().collect(),
                buckets: HashMap::new(),
            }),
        }
    }

    /// Consume one token for `key`. `true` if admitted.
    pub async fn allow_action(&self, key: &K) -> bool {
        self.try_acquire(key).await.is_ok()
    }

    /// Consume one token for `key`, or report how long until one refills.
    pub async fn try_acquire(&self, key: &K) -> Result<(), Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let bucket = inner.bucket(key, now);
        if bucket.try_acquire(now) {
            Ok(())
        } else {
            let retry_after = bucket.retry_after();
            debug!(key = ?key, retry_after_ms = retry_after.as_millis() as u64, "rate limited");
            Err(retry_after)
        }
    }

    /// Tokens currently in `key`'s bucket (after refill).
    pub async fn available_tokens(&self, key: &K) -> f64 {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.bucket(key, now).available(now)
    }

    /// Replace `key`'s parameters. The bucket restarts full at the new
    /// capacity.
    pub async fn set_config(&self, key: K, cfg: RateLimitConfig) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.buckets.insert(key.clone(), TokenBucket::new(cfg, now));
        inner.configs.insert(key, cfg);
    }

    /// Refill `key`'s bucket to capacity.
    pub async fn reset(&self, key: &K) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let cfg = inner.config_for(key);
        inner.buckets.insert(key.clone(), TokenBucket::new(cfg, now));
    }

    /// Refill every bucket to capacity.
    pub async fn reset_all(&self) {
        let mut inner = self.inner.lock().await;
        inner.buckets.clear();
    }
}
