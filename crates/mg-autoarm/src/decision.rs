//! Auto-arm decision policy.
//!
//! # Evaluation order
//!
//! 1. configuration disabled        → Skip(Disabled)
//! 2. state Armed/GracePeriod/Triggered → Skip(AlreadyArmed)
//! 3. now < disabled_until          → Skip(TemporarilyDisabled)
//! 4. now < last_auto_arm + cooldown → Skip(CooldownPeriod)
//! 5. otherwise                     → Arm(trigger description), last_auto_arm = now
//!
//! The first matching rule wins. Evaluations are serialized; two events
//! inside one cooldown window yield exactly one Arm.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mg_arming::saturating_deadline;
use mg_schemas::{AppState, AutoArmConfiguration, AutoArmTrigger};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};

/// One environmental signal, consumed once by [`AutoArmDecisionEngine::evaluate`].
#[derive(Debug, Clone)]
pub struct AutoArmEvent {
    pub trigger: AutoArmTrigger,
    /// Monotonic time the decision is evaluated against.
    pub timestamp: Instant,
    pub observed_at: DateTime<Utc>,
    pub configuration: AutoArmConfiguration,
}

impl AutoArmEvent {
    pub fn new(trigger: AutoArmTrigger, configuration: AutoArmConfiguration) -> Self {
        Self {
            trigger,
            timestamp: Instant::now(),
            observed_at: Utc::now(),
            configuration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    AlreadyArmed,
    TemporarilyDisabled { until: Instant },
    CooldownPeriod { until: Instant },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::AlreadyArmed => "already_armed",
            SkipReason::TemporarilyDisabled { .. } => "temporarily_disabled",
            SkipReason::CooldownPeriod { .. } => "cooldown_period",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let now = Instant::now();
        match self {
            SkipReason::TemporarilyDisabled { until } | SkipReason::CooldownPeriod { until } => {
                write!(
                    f,
                    "{} ({}s left)",
                    self.as_str(),
                    until.saturating_duration_since(now).as_secs()
                )
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoArmDecision {
    Arm { reason: String },
    Skip(SkipReason),
}

impl AutoArmDecision {
    pub fn is_arm(&self) -> bool {
        matches!(self, AutoArmDecision::Arm { .. })
    }
}

#[derive(Debug, Default)]
struct Inner {
    last_auto_arm: Option<Instant>,
    disabled_until: Option<Instant>,
}

/// Stateful auto-arm policy. Reads the arm state from a watch channel; never
/// arms anything itself.
pub struct AutoArmDecisionEngine {
    state: watch::Receiver<AppState>,
    inner: Mutex<Inner>,
}

impl AutoArmDecisionEngine {
    pub fn new(state: watch::Receiver<AppState>) -> Self {
        Self {
            state,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn evaluate(&self, event: &AutoArmEvent) -> AutoArmDecision {
        let decision = self.decide(event).await;
        match &decision {
            AutoArmDecision::Arm { reason } => info!(%reason, "auto-arm decision: arm"),
            AutoArmDecision::Skip(skip) => {
                debug!(trigger = %event.trigger, reason = %skip, "auto-arm decision: skip")
            }
        }
        decision
    }

    async fn decide(&self, event: &AutoArmEvent) -> AutoArmDecision {
        if !event.configuration.is_enabled {
            return AutoArmDecision::Skip(SkipReason::Disabled);
        }
        if self.state.borrow().is_armed_or_beyond() {
            return AutoArmDecision::Skip(SkipReason::AlreadyArmed);
        }

        let now = event.timestamp;
        let mut inner = self.inner.lock().await;
        if let Some(until) = inner.disabled_until {
            if now < until {
                return AutoArmDecision::Skip(SkipReason::TemporarilyDisabled { until });
            }
        }
        if let Some(last) = inner.last_auto_arm {
            let until = saturating_deadline(last, event.configuration.cooldown_period);
            if now < until {
                return AutoArmDecision::Skip(SkipReason::CooldownPeriod { until });
            }
        }

        inner.last_auto_arm = Some(now);
        AutoArmDecision::Arm {
            reason: event.trigger.to_string(),
        }
    }

    /// Suppress automatic arming for `duration` from now. Returns the
    /// deadline. Durations past [`mg_arming::MAX_DELAY`] saturate.
    pub async fn temporarily_disable(&self, duration: Duration) -> Instant {
        let until = saturating_deadline(Instant::now(), duration);
        self.inner.lock().await.disabled_until = Some(until);
        info!(secs = duration.as_secs(), "auto-arm temporarily disabled");
        until
    }

    pub async fn cancel_temporary_disable(&self) {
        self.inner.lock().await.disabled_until = None;
        info!("auto-arm temporary disable cancelled");
    }

    /// Remaining temporary-disable window, if any.
    pub async fn disabled_for(&self) -> Option<Duration> {
        let until = self.inner.lock().await.disabled_until?;
        let left = until.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    pub async fn last_auto_arm(&self) -> Option<Instant> {
        self.inner.lock().await.last_auto_arm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> AutoArmConfiguration {
        AutoArmConfiguration {
            is_enabled: true,
            cooldown_period: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn event(cfg: &AutoArmConfiguration) -> AutoArmEvent {
        AutoArmEvent::new(AutoArmTrigger::UntrustedNetwork("cafe".into()), cfg.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_configuration_skips() {
        let (_tx, rx) = watch::channel(AppState::Disarmed);
        let engine = AutoArmDecisionEngine::new(rx);
        let d = engine.evaluate(&event(&AutoArmConfiguration::default())).await;
        assert_eq!(d, AutoArmDecision::Skip(SkipReason::Disabled));
    }

    #[tokio::test(start_paused = true)]
    async fn armed_or_beyond_skips() {
        for state in [AppState::Armed, AppState::GracePeriod, AppState::Triggered] {
            let (_tx, rx) = watch::channel(state);
            let engine = AutoArmDecisionEngine::new(rx);
            assert_eq!(
                engine.evaluate(&event(&enabled())).await,
                AutoArmDecision::Skip(SkipReason::AlreadyArmed)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arm_reason_is_trigger_description() {
        let (_tx, rx) = watch::channel(AppState::Disarmed);
        let engine = AutoArmDecisionEngine::new(rx);
        let d = engine.evaluate(&event(&enabled())).await;
        assert_eq!(
            d,
            AutoArmDecision::Arm {
                reason: "connected to untrusted network 'cafe'".into()
            }
        );
        assert!(engine.last_auto_arm().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires() {
        let (_tx, rx) = watch::channel(AppState::Disarmed);
        let engine = AutoArmDecisionEngine::new(rx);
        assert!(engine.evaluate(&event(&enabled())).await.is_arm());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(matches!(
            engine.evaluate(&event(&enabled())).await,
            AutoArmDecision::Skip(SkipReason::CooldownPeriod { .. })
        ));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(engine.evaluate(&event(&enabled())).await.is_arm());
    }

    #[tokio::test(start_paused = true)]
    async fn temporary_disable_wins_over_cooldown_and_can_be_cancelled() {
        let (_tx, rx) = watch::channel(AppState::Disarmed);
        let engine = AutoArmDecisionEngine::new(rx);
        let until = engine.temporarily_disable(Duration::from_secs(300)).await;

        assert_eq!(
            engine.evaluate(&event(&enabled())).await,
            AutoArmDecision::Skip(SkipReason::TemporarilyDisabled { until })
        );
        assert_eq!(engine.disabled_for().await, Some(Duration::from_secs(300)));

        engine.cancel_temporary_disable().await;
        assert_eq!(engine.disabled_for().await, None);
        assert!(engine.evaluate(&event(&enabled())).await.is_arm());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_windows_saturate_instead_of_overflowing() {
        let (_tx, rx) = watch::channel(AppState::Disarmed);
        let engine = AutoArmDecisionEngine::new(rx);
        engine.temporarily_disable(Duration::from_secs(u64::MAX)).await;
        assert!(engine.disabled_for().await.is_some());
        engine.cancel_temporary_disable().await;

        let cfg = AutoArmConfiguration {
            cooldown_period: Duration::MAX,
            ..enabled()
        };
        assert!(engine.evaluate(&event(&cfg)).await.is_arm());
        assert!(matches!(
            engine.evaluate(&event(&cfg)).await,
            AutoArmDecision::Skip(SkipReason::CooldownPeriod { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_read_live_from_watch_channel() {
        let (tx, rx) = watch::channel(AppState::Armed);
        let engine = AutoArmDecisionEngine::new(rx);
        assert!(!engine.evaluate(&event(&enabled())).await.is_arm());
        tx.send_replace(AppState::Disarmed);
        assert!(engine.evaluate(&event(&enabled())).await.is_arm());
    }
}
