//! Resource protector: rate limiter + circuit breaker behind one API.
//!
//! # Admission order
//!
//! 1. Protection enabled flag. When disabled, **every** check fails with
//!    [`ProtectionError::ProtectionDisabled`] (fail-closed).
//! 2. Rate limiter: no token → [`ProtectionError::RateLimited`].
//! 3. Circuit breaker: not allowed → [`ProtectionError::CircuitOpen`].
//!
//! After an admitted check the caller runs the effect and MUST report the
//! outcome via [`ResourceProtector::record_success`] or
//! [`ResourceProtector::record_failure`]. Outcomes feed the breaker only;
//! tokens feed the limiter only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use mg_schemas::SecurityActionType;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ProtectionError, ProtectionMetrics,
    ProtectionPolicies, RateLimitConfig, RateLimiter,
};

pub struct ResourceProtector {
    enabled: AtomicBool,
    rate_limiter: RateLimiter<SecurityActionType>,
    circuit_breaker: CircuitBreaker<SecurityActionType>,
    metrics: Mutex<HashMap<SecurityActionType, ProtectionMetrics>>,
}

impl Default for ResourceProtector {
    fn default() -> Self {
        Self::new(&ProtectionPolicies::default())
    }
}

impl ResourceProtector {
    pub fn new(policies: &ProtectionPolicies) -> Self {
        let rate_limits = SecurityActionType::ALL
            .into_iter()
            .map(|a| (a, policies.policy(a).rate_limit));
        let breakers = SecurityActionType::ALL
            .into_iter()
            .map(|a| (a, policies.policy(a).circuit_breaker));

        Self {
            enabled: AtomicBool::new(policies.enabled),
            rate_limiter: RateLimiter::with_configs(RateLimitConfig::new(1, 1.0), rate_limits),
            circuit_breaker: CircuitBreaker::with_configs(CircuitBreakerConfig::default(), breakers),
            metrics: Mutex::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Gate one attempt of `action`. `Ok(())` means the caller may proceed.
    pub async fn check_action(&self, action: SecurityActionType) -> Result<(), ProtectionError> {
        self.with_metrics(action, |m| {
            m.total_attempts += 1;
            m.last_attempt = Some(Utc::now());
        })
        .await;

        // A disabled protector rejects rather than bypassing.
        if !self.is_enabled() {
            warn!(action = %action, "protection disabled; rejecting (fail-closed)");
            return Err(ProtectionError::ProtectionDisabled);
        }

        if let Err(retry_after) = self.rate_limiter.try_acquire(&action).await {
            self.with_metrics(action, |m| m.rate_limited_attempts += 1).await;
            warn!(
                action = %action,
                retry_after_ms = retry_after.as_millis() as u64,
                "action rate limited"
            );
            return Err(ProtectionError::RateLimited {
                action,
                retry_after,
            });
        }

        if !self.circuit_breaker.can_execute(&action).await {
            let state = self.circuit_breaker.state(&action).await;
            self.with_metrics(action, |m| m.circuit_rejections += 1).await;
            warn!(action = %action, state = %state, "action rejected by circuit breaker");
            return Err(ProtectionError::CircuitOpen { action, state });
        }

        Ok(())
    }

    pub async fn record_success(&self, action: SecurityActionType) {
        self.circuit_breaker.record_success(&action).await;
        self.with_metrics(action, |m| {
            m.successful_executions += 1;
            m.last_success = Some(Utc::now());
        })
        .await;
    }

    pub async fn record_failure(&self, action: SecurityActionType) {
        self.circuit_breaker.record_failure(&action).await;
        self.with_metrics(action, |m| {
            m.failed_executions += 1;
            m.last_failure = Some(Utc::now());
        })
        .await;
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Restore `action` to its initial state: full bucket, Closed breaker,
    /// zeroed metrics.
    pub async fn reset(&self, action: SecurityActionType) {
        self.rate_limiter.reset(&action).await;
        self.circuit_breaker.reset(&action).await;
        self.metrics.lock().await.remove(&action);
        info!(action = %action, "protection reset");
    }

    pub async fn reset_all(&self) {
        self.rate_limiter.reset_all().await;
        self.circuit_breaker.reset_all().await;
        self.metrics.lock().await.clear();
        info!("protection reset for all actions");
    }

    /// Swap in new policies. Every key restarts from its initial state under
    /// the new parameters.
    pub async fn apply_policies(&self, policies: &ProtectionPolicies) {
        for action in SecurityActionType::ALL {
            let policy = policies.policy(action);
            self.rate_limiter.set_config(action, policy.rate_limit).await;
            self.circuit_breaker
                .set_config(action, policy.circuit_breaker)
                .await;
        }
        self.set_enabled(policies.enabled);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Snapshot of `action`'s metrics.
    pub async fn metrics(&self, action: SecurityActionType) -> ProtectionMetrics {
        self.metrics
            .lock()
            .await
            .get(&action)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn circuit_state(&self, action: SecurityActionType) -> CircuitState {
        self.circuit_breaker.state(&action).await
    }

    pub async fn available_tokens(&self, action: SecurityActionType) -> f64 {
        self.rate_limiter.available_tokens(&action).await
    }

    async fn with_metrics(&self, action: SecurityActionType, f: impl FnOnce(&mut ProtectionMetrics)) {
        let mut all = self.metrics.lock().await;
        f(all.entry(action).or_default());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ProtectionPolicy;

    fn policies(capacity: u32, failure_threshold: u32) -> ProtectionPolicies {
        let mut p = ProtectionPolicies::default();
        p.per_action.insert(
            SecurityActionType::SoundAlarm,
            ProtectionPolicy {
                rate_limit: RateLimitConfig::new(capacity, 0.01),
                circuit_breaker: CircuitBreakerConfig::new(
                    failure_threshold,
                    1,
                    Duration::from_secs(30),
                ),
            },
        );
        p
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_protection_fails_closed() {
        let rp = ResourceProtector::new(&policies(5, 3));
        rp.set_enabled(false);
        let err = rp.check_action(SecurityActionType::LockScreen).await.unwrap_err();
        assert_eq!(err, ProtectionError::ProtectionDisabled);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_checked_before_breaker() {
        let rp = ResourceProtector::new(&policies(1, 1));
        rp.check_action(SecurityActionType::SoundAlarm).await.unwrap();
        rp.record_failure(SecurityActionType::SoundAlarm).await;

        // Both gates would refuse; the limiter answers first.
        let err = rp.check_action(SecurityActionType::SoundAlarm).await.unwrap_err();
        assert!(matches!(err, ProtectionError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn near_zero_refill_rate_rejects_without_overflow() {
        let mut p = ProtectionPolicies::default();
        p.per_action.insert(
            SecurityActionType::LockScreen,
            ProtectionPolicy {
                rate_limit: RateLimitConfig::new(1, 1e-20),
                ..ProtectionPolicy::default_for(SecurityActionType::LockScreen)
            },
        );
        p.validate().unwrap();
        let rp = ResourceProtector::new(&p);

        rp.check_action(SecurityActionType::LockScreen).await.unwrap();
        let err = rp.check_action(SecurityActionType::LockScreen).await.unwrap_err();
        assert_eq!(
            err,
            ProtectionError::RateLimited {
                action: SecurityActionType::LockScreen,
                retry_after: Duration::MAX,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_rejects_with_state() {
        let rp = ResourceProtector::new(&policies(10, 2));
        for _ in 0..2 {
            rp.check_action(SecurityActionType::SoundAlarm).await.unwrap();
            rp.record_failure(SecurityActionType::SoundAlarm).await;
        }
        let err = rp.check_action(SecurityActionType::SoundAlarm).await.unwrap_err();
        assert_eq!(
            err,
            ProtectionError::CircuitOpen {
                action: SecurityActionType::SoundAlarm,
                state: CircuitState::Open,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_track_every_check_and_outcome() {
        let rp = ResourceProtector::new(&policies(2, 5));
        let a = SecurityActionType::SoundAlarm;

        rp.check_action(a).await.unwrap();
        rp.record_success(a).await;
        rp.check_action(a).await.unwrap();
        rp.record_failure(a).await;
        assert!(rp.check_action(a).await.is_err());

        let m = rp.metrics(a).await;
        assert_eq!(m.total_attempts, 3);
        assert_eq!(m.successful_executions, 1);
        assert_eq!(m.failed_executions, 1);
        assert_eq!(m.rate_limited_attempts, 1);
        assert_eq!(m.circuit_rejections, 0);
        assert!(m.last_attempt.is_some());
        assert!(m.last_success.is_some());
        assert!(m.last_failure.is_some());
        assert!((m.success_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_initial_state() {
        let rp = ResourceProtector::new(&policies(1, 1));
        let a = SecurityActionType::SoundAlarm;
        rp.check_action(a).await.unwrap();
        rp.record_failure(a).await;
        assert_eq!(rp.circuit_state(a).await, CircuitState::Open);

        rp.reset(a).await;
        assert_eq!(rp.circuit_state(a).await, CircuitState::Closed);
        assert_eq!(rp.available_tokens(a).await, 1.0);
        assert_eq!(rp.metrics(a).await, ProtectionMetrics::default());
        assert!(rp.check_action(a).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_policies_swaps_parameters() {
        let rp = ResourceProtector::new(&policies(1, 1));
        rp.apply_policies(&policies(4, 1)).await;
        assert_eq!(rp.available_tokens(SecurityActionType::SoundAlarm).await, 4.0);

        let mut off = policies(4, 1);
        off.enabled = false;
        rp.apply_policies(&off).await;
        assert!(!rp.is_enabled());
    }
}
