//! Per-key three-state circuit breaker.
//!
//! ```text
//!            failures >= failure_threshold
//!   Closed ─────────────────────────────────► Open
//!     ▲                                        │
//!     │ successes >= success_threshold         │ timeout elapsed
//!     │                                        ▼ (next query)
//!     └─────────────────────────────────── HalfOpen
//!                                              │
//!                      any failure ────────────┘──► Open (timestamp renewed)
//! ```
//!
//! The Open→HalfOpen move is lazy: it happens on the first state query after
//! the timeout, never on a timer. Breakers for different keys are fully
//! independent.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{CircuitBreakerConfig, CircuitState};

// ---------------------------------------------------------------------------
// BreakerState
// ---------------------------------------------------------------------------

/// Breaker bookkeeping for one key. Pure: the caller supplies `now`.
#[derive(Debug, Clone)]
pub struct BreakerState {
    cfg: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

impl BreakerState {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
        }
    }

    /// Current state, applying the lazy Open→HalfOpen move.
    pub fn state(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if now.saturating_duration_since(opened_at) >= self.cfg.timeout {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                }
            }
        }
        self.state
    }

    pub fn can_execute(&mut self, now: Instant) -> bool {
        self.state(now) != CircuitState::Open
    }

    pub fn record_success(&mut self, now: Instant) {
        match self.state(now) {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.cfg.success_threshold {
                    self.close();
                }
            }
            // Calls are rejected while open; a late success changes nothing.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        match self.state(now) {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.cfg.failure_threshold {
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => self.open(now),
            CircuitState::Open => {}
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
        self.opened_at = None;
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

struct Inner<K> {
    default_config: CircuitBreakerConfig,
    configs: HashMap<K, CircuitBreakerConfig>,
    breakers: HashMap<K, BreakerState>,
}

impl<K: Eq + Hash + Clone> Inner<K> {
    fn breaker(&mut self, key: &K) -> &mut BreakerState {
        let cfg = self.configs.get(key).copied().unwrap_or(self.default_config);
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| BreakerState::new(cfg))
    }
}

/// Failure-cascade admission control keyed by `K`.
///
/// Only outcomes (`record_success` / `record_failure`) move a breaker;
/// admission checks never do, apart from the lazy Open→HalfOpen move.
pub struct CircuitBreaker<K> {
    inner: Mutex<Inner<K>>,
}

impl<K> CircuitBreaker<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                default_config,
                configs: HashMap::new(),
                breakers: HashMap::new(),
            }),
        }
    }

    pub fn with_configs(
        default_config: CircuitBreakerConfig,
        configs: impl IntoIterator<Item = (K, CircuitBreakerConfig)>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                default_config,
                configs: configs.into_iter().collect(),
                breakers: HashMap::new(),
            }),
        }
    }

    pub async fn can_execute(&self, key: &K) -> bool {
        let now = Instant::now();
        self.inner.lock().await.breaker(key).can_execute(now)
    }

    pub async fn state(&self, key: &K) -> CircuitState {
        let now = Instant::now();
        self.inner.lock().await.breaker(key).state(now)
    }

    pub async fn record_success(&self, key: &K) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let breaker = inner.breaker(key);
        let before = breaker.state(now);
        breaker.record_success(now);
        if before == CircuitState::HalfOpen && breaker.state(now) == CircuitState::Closed {
            info!(key = ?key, "circuit closed");
        }
    }

    pub async fn record_failure(&self, key: &K) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let breaker = inner.breaker(key);
        let before = breaker.state(now);
        breaker.record_failure(now);
        if before != CircuitState::Open && breaker.state(now) == CircuitState::Open {
            warn!(key = ?key, from = %before, "circuit opened");
        }
    }

    /// Replace `key`'s thresholds. The breaker restarts Closed.
    pub async fn set_config(&self, key: K, cfg: CircuitBreakerConfig) {
        let mut inner = self.inner.lock().await;
        inner.breakers.insert(key.clone(), BreakerState::new(cfg));
        inner.configs.insert(key, cfg);
    }

    /// Force `key` Closed with all counters zeroed.
    pub async fn reset(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.breakers.remove(key);
    }

    pub async fn reset_all(&self) {
        self.inner.lock().await.breakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn cfg() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(2, 2, Duration::from_secs(10))
    }

    #[test]
    fn failures_open_the_circuit() {
        let t0 = Instant::now();
        let mut b = BreakerState::new(cfg());
        b.record_failure(t0);
        assert_eq!(b.state(t0), CircuitState::Closed);
        b.record_failure(t0);
        assert_eq!(b.state(t0), CircuitState::Open);
        assert!(!b.can_execute(t0));
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn success_in_closed_resets_failure_count() {
        let t0 = Instant::now();
        let mut b = BreakerState::new(cfg());
        b.record_failure(t0);
        assert_eq!(b.consecutive_failures(), 1);
        b.record_success(t0);
        assert_eq!(b.consecutive_failures(), 0);
        b.record_failure(t0);
        assert_eq!(b.state(t0), CircuitState::Closed);
    }

    #[test]
    fn open_stays_open_until_timeout() {
        let t0 = Instant::now();
        let mut b = BreakerState::new(cfg());
        b.record_failure(t0);
        b.record_failure(t0);
        assert!(!b.can_execute(t0 + Duration::from_secs(9)));
        assert_eq!(b.state(t0 + Duration::from_secs(10)), CircuitState::HalfOpen);
        assert!(b.can_execute(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_timestamp() {
        let t0 = Instant::now();
        let mut b = BreakerState::new(cfg());
        b.record_failure(t0);
        b.record_failure(t0);

        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(b.state(t1), CircuitState::HalfOpen);
        b.record_failure(t1);
        assert_eq!(b.state(t1), CircuitState::Open);

        // The timeout counts from the re-open, not the original open.
        assert_eq!(b.state(t1 + Duration::from_secs(9)), CircuitState::Open);
        assert_eq!(b.state(t1 + Duration::from_secs(10)), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let t0 = Instant::now();
        let mut b = BreakerState::new(cfg());
        b.record_failure(t0);
        b.record_failure(t0);

        let t1 = t0 + Duration::from_secs(10);
        b.record_success(t1);
        assert_eq!(b.state(t1), CircuitState::HalfOpen);
        b.record_success(t1);
        assert_eq!(b.state(t1), CircuitState::Closed);
    }

    #[test]
    fn success_while_open_is_ignored() {
        let t0 = Instant::now();
        let mut b = BreakerState::new(cfg());
        b.record_failure(t0);
        b.record_failure(t0);
        b.record_success(t0);
        b.record_success(t0);
        assert_eq!(b.state(t0), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn keyed_breakers_are_independent_and_resettable() {
        let cb = CircuitBreaker::new(cfg());
        cb.record_failure(&"alarm").await;
        cb.record_failure(&"alarm").await;
        assert_eq!(cb.state(&"alarm").await, CircuitState::Open);
        assert_eq!(cb.state(&"lock").await, CircuitState::Closed);

        cb.reset(&"alarm").await;
        assert_eq!(cb.state(&"alarm").await, CircuitState::Closed);
        assert!(cb.can_execute(&"alarm").await);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_moves_to_half_open_on_next_query() {
        let cb = CircuitBreaker::new(cfg());
        cb.record_failure(&"alarm").await;
        cb.record_failure(&"alarm").await;
        assert!(!cb.can_execute(&"alarm").await);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.state(&"alarm").await, CircuitState::HalfOpen);
        assert!(cb.can_execute(&"alarm").await);
    }
}
