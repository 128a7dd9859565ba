use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policy for arming automatically on environmental signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoArmConfiguration {
    pub is_enabled: bool,
    pub arm_by_location: bool,
    pub arm_on_untrusted_network: bool,
    /// Minimum spacing between two automatic arms.
    pub cooldown_period: Duration,
    pub notify_before_arming: bool,
    /// Delay between the pre-arm notification and the actual arm.
    pub notification_delay: Duration,
}

impl Default for AutoArmConfiguration {
    fn default() -> Self {
        Self {
            is_enabled: false,
            arm_by_location: true,
            arm_on_untrusted_network: true,
            cooldown_period: Duration::from_secs(60),
            notify_before_arming: true,
            notification_delay: Duration::from_secs(5),
        }
    }
}

/// The environmental change that produced an auto-arm event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AutoArmTrigger {
    /// The device moved outside every trusted location; carries the name of
    /// the location that was left.
    LeftTrustedLocation(String),
    /// First fix outside all trusted locations.
    EnteredUntrustedLocation,
    /// Joined a network whose SSID is not trusted.
    UntrustedNetwork(String),
    /// Dropped off a trusted network.
    LostTrustedNetwork(String),
    /// Operator-requested evaluation.
    Manual(String),
}

impl AutoArmTrigger {
    pub fn is_location(&self) -> bool {
        matches!(
            self,
            AutoArmTrigger::LeftTrustedLocation(_) | AutoArmTrigger::EnteredUntrustedLocation
        )
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            AutoArmTrigger::UntrustedNetwork(_) | AutoArmTrigger::LostTrustedNetwork(_)
        )
    }
}

impl fmt::Display for AutoArmTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoArmTrigger::LeftTrustedLocation(name) => write!(f, "left trusted location '{name}'"),
            AutoArmTrigger::EnteredUntrustedLocation => write!(f, "entered untrusted location"),
            AutoArmTrigger::UntrustedNetwork(ssid) => write!(f, "connected to untrusted network '{ssid}'"),
            AutoArmTrigger::LostTrustedNetwork(ssid) => write!(f, "disconnected from trusted network '{ssid}'"),
            AutoArmTrigger::Manual(reason) => write!(f, "manual: {reason}"),
        }
    }
}
