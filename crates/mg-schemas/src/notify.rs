use std::time::Duration;

use serde::{Deserialize, Serialize};

/// User-facing notification emitted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Armed { automatic: bool },
    Disarmed,
    GracePeriodStarted { seconds: u64 },
    GracePeriodCancelled,
    Triggered,
    ActionsCompleted { succeeded: usize, failed: usize },
    AutoArmPending { reason: String, delay_secs: u64 },
    AutoArmCancelled,
}

impl Notification {
    pub fn from_grace_period(d: Duration) -> Self {
        Notification::GracePeriodStarted { seconds: d.as_secs() }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Notification::Armed { .. } => "Power guard armed",
            Notification::Disarmed => "Power guard disarmed",
            Notification::GracePeriodStarted { .. } => "Power disconnected",
            Notification::GracePeriodCancelled => "Security response cancelled",
            Notification::Triggered => "Security response triggered",
            Notification::ActionsCompleted { .. } => "Security actions finished",
            Notification::AutoArmPending { .. } => "Arming soon",
            Notification::AutoArmCancelled => "Automatic arm cancelled",
        }
    }
}

/// Fire-and-forget notification sink.
///
/// Implementations must not block; the core never waits for delivery and
/// ignores failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}
