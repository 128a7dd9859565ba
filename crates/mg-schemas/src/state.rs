//! Top-level arm state and arming configuration.
//!
//! # Invariants
//!
//! - **Boot is always disarmed**: a fresh controller starts in
//!   [`AppState::Disarmed`]. Nothing is persisted across restarts.
//! - **Triggered is sticky**: the only exit from [`AppState::Triggered`] is an
//!   authenticated disarm.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// The guard's single top-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// Power events are ignored.
    Disarmed,
    /// A power disconnect starts the grace period (or triggers immediately).
    Armed,
    /// Countdown running; authenticated cancellation returns to `Armed`.
    GracePeriod,
    /// Security actions have been dispatched.
    Triggered,
}

impl AppState {
    /// `true` for every state other than `Disarmed`.
    pub fn is_armed_or_beyond(&self) -> bool {
        !matches!(self, AppState::Disarmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Disarmed => "disarmed",
            AppState::Armed => "armed",
            AppState::GracePeriod => "grace_period",
            AppState::Triggered => "triggered",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shortest non-zero grace period accepted; shorter values are clamped up.
pub const MIN_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Longest grace period accepted; longer values are clamped down.
pub const MAX_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Arm/disarm policy consumed by the arm controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmingConfiguration {
    /// Zero means "no grace period": a disconnect triggers immediately.
    pub grace_period: Duration,
    pub allow_grace_period_cancellation: bool,
    /// When false, `disarm` accepts any authentication outcome.
    pub require_auth_to_disarm: bool,
}

impl Default for ArmingConfiguration {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            allow_grace_period_cancellation: true,
            require_auth_to_disarm: true,
        }
    }
}

impl ArmingConfiguration {
    /// Build from a raw seconds value, clamping non-zero values into
    /// [`MIN_GRACE_PERIOD`]..=[`MAX_GRACE_PERIOD`].
    pub fn from_grace_secs(
        grace_secs: f64,
        allow_grace_period_cancellation: bool,
        require_auth_to_disarm: bool,
    ) -> Result<Self, ConfigurationError> {
        if !grace_secs.is_finite() || grace_secs < 0.0 {
            return Err(ConfigurationError::invalid(format!(
                "grace_period_secs must be a non-negative number, got {grace_secs}"
            )));
        }
        // Clamp as f64 first: huge finite values do not fit in a Duration.
        let grace_secs = if grace_secs == 0.0 {
            0.0
        } else {
            grace_secs.clamp(MIN_GRACE_PERIOD.as_secs_f64(), MAX_GRACE_PERIOD.as_secs_f64())
        };
        Ok(Self {
            grace_period: Duration::from_secs_f64(grace_secs),
            allow_grace_period_cancellation,
            require_auth_to_disarm,
        })
    }

    pub fn has_grace_period(&self) -> bool {
        !self.grace_period.is_zero()
    }
}
