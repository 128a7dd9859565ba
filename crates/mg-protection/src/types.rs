use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mg_schemas::{ConfigurationError, SecurityActionType};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rate limiter configuration
// ---------------------------------------------------------------------------

/// Token bucket parameters for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens held; also the burst size.
    pub capacity: u32,
    /// Tokens added per second of elapsed time.
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.capacity == 0 {
            return Err(ConfigurationError::invalid("rate_limit.capacity must be >= 1"));
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(ConfigurationError::invalid(format!(
                "rate_limit.refill_per_sec must be > 0, got {}",
                self.refill_per_sec
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker configuration + state
// ---------------------------------------------------------------------------

/// Breaker thresholds for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive successes in HalfOpen that close the circuit.
    pub success_threshold: u32,
    /// Time spent Open before the next query moves to HalfOpen.
    pub timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            timeout,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.failure_threshold == 0 {
            return Err(ConfigurationError::invalid(
                "circuit_breaker.failure_threshold must be >= 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigurationError::invalid(
                "circuit_breaker.success_threshold must be >= 1",
            ));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(3, 2, Duration::from_secs(30))
    }
}

/// Breaker state for one key.
///
/// Legal transitions: Closed→Open, Open→HalfOpen (time-gated, lazy),
/// HalfOpen→Closed, HalfOpen→Open. `reset` forces Closed from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half_open"),
        }
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Rate limit + breaker settings for one action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtectionPolicy {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ProtectionPolicy {
    /// Built-in defaults. The more destructive the action, the smaller the
    /// burst and the slower the refill.
    pub fn default_for(action: SecurityActionType) -> Self {
        let (rate_limit, circuit_breaker) = match action {
            SecurityActionType::LockScreen => (
                RateLimitConfig::new(5, 0.5),
                CircuitBreakerConfig::new(3, 2, Duration::from_secs(30)),
            ),
            SecurityActionType::SoundAlarm => (
                RateLimitConfig::new(3, 0.1),
                CircuitBreakerConfig::new(3, 2, Duration::from_secs(30)),
            ),
            SecurityActionType::ForceLogout => (
                RateLimitConfig::new(2, 1.0 / 60.0),
                CircuitBreakerConfig::new(2, 1, Duration::from_secs(60)),
            ),
            SecurityActionType::Shutdown => (
                RateLimitConfig::new(1, 1.0 / 300.0),
                CircuitBreakerConfig::new(2, 1, Duration::from_secs(120)),
            ),
            SecurityActionType::CustomScript => (
                RateLimitConfig::new(3, 1.0 / 30.0),
                CircuitBreakerConfig::new(3, 2, Duration::from_secs(60)),
            ),
        };
        Self {
            rate_limit,
            circuit_breaker,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()
    }
}

/// Complete protection configuration for a [`crate::ResourceProtector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionPolicies {
    /// When false every check fails with [`ProtectionError::ProtectionDisabled`].
    pub enabled: bool,
    pub per_action: HashMap<SecurityActionType, ProtectionPolicy>,
}

impl Default for ProtectionPolicies {
    fn default() -> Self {
        Self {
            enabled: true,
            per_action: SecurityActionType::ALL
                .into_iter()
                .map(|a| (a, ProtectionPolicy::default_for(a)))
                .collect(),
        }
    }
}

impl ProtectionPolicies {
    pub fn policy(&self, action: SecurityActionType) -> ProtectionPolicy {
        self.per_action
            .get(&action)
            .copied()
            .unwrap_or_else(|| ProtectionPolicy::default_for(action))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (action, policy) in &self.per_action {
            policy
                .validate()
                .map_err(|ConfigurationError::Invalid(r)| {
                    ConfigurationError::invalid(format!("protection.{action}: {r}"))
                })?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Accumulated admission statistics for one action key.
///
/// Counters only grow until the key is reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectionMetrics {
    pub total_attempts: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub rate_limited_attempts: u64,
    pub circuit_rejections: u64,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl ProtectionMetrics {
    /// Fraction of attempts that completed successfully; 0 with no attempts.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_attempts as f64
        }
    }
}

// ---------------------------------------------------------------------------
// ProtectionError
// ---------------------------------------------------------------------------

/// An admission rejection. Terminal for the single attempt; the core does
/// not retry.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtectionError {
    RateLimited {
        action: SecurityActionType,
        retry_after: Duration,
    },
    CircuitOpen {
        action: SecurityActionType,
        state: CircuitState,
    },
    ProtectionDisabled,
}

impl fmt::Display for ProtectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionError::RateLimited {
                action,
                retry_after,
            } => write!(
                f,
                "PROTECTION_RATE_LIMITED: {action} retry after {:.1}s",
                retry_after.as_secs_f64()
            ),
            ProtectionError::CircuitOpen { action, state } => {
                write!(f, "PROTECTION_CIRCUIT_OPEN: {action} circuit is {state}")
            }
            ProtectionError::ProtectionDisabled => {
                write!(f, "PROTECTION_DISABLED: resource protection is disabled")
            }
        }
    }
}

impl std::error::Error for ProtectionError {}
