use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

// ---------------------------------------------------------------------------
// SecurityActionType
// ---------------------------------------------------------------------------

/// A single destructive effect. Also the protection key for rate limiting
/// and circuit breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityActionType {
    LockScreen,
    SoundAlarm,
    ForceLogout,
    Shutdown,
    CustomScript,
}

impl SecurityActionType {
    /// Every action type, in execution order.
    pub const ALL: [SecurityActionType; 5] = [
        SecurityActionType::LockScreen,
        SecurityActionType::SoundAlarm,
        SecurityActionType::ForceLogout,
        SecurityActionType::Shutdown,
        SecurityActionType::CustomScript,
    ];

    /// Lower runs first. `LockScreen` is always 0.
    pub fn execution_priority(&self) -> u8 {
        match self {
            SecurityActionType::LockScreen => 0,
            SecurityActionType::SoundAlarm => 1,
            SecurityActionType::ForceLogout => 2,
            SecurityActionType::Shutdown => 3,
            SecurityActionType::CustomScript => 4,
        }
    }

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityActionType::LockScreen => "lockScreen",
            SecurityActionType::SoundAlarm => "soundAlarm",
            SecurityActionType::ForceLogout => "forceLogout",
            SecurityActionType::Shutdown => "shutdown",
            SecurityActionType::CustomScript => "customScript",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for SecurityActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort a set of actions into execution order: `LockScreen` first, then the
/// fixed secondary order of [`SecurityActionType::execution_priority`].
pub fn execution_order(actions: &[SecurityActionType]) -> Vec<SecurityActionType> {
    let mut sorted = actions.to_vec();
    sorted.sort_by_key(|a| a.execution_priority());
    sorted
}

// ---------------------------------------------------------------------------
// SecurityActionConfiguration
// ---------------------------------------------------------------------------

/// The response to run when the guard triggers.
///
/// Construct through [`SecurityActionConfiguration::validate`]-checked paths;
/// the engine assumes a validated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityActionConfiguration {
    /// Non-empty, no duplicates.
    pub enabled_actions: Vec<SecurityActionType>,
    /// Wait before the first action starts.
    pub action_delay: Duration,
    /// Sequential mode only: pause between consecutive actions.
    #[serde(default)]
    pub action_spacing: Duration,
    /// In [0, 1].
    pub alarm_volume: f32,
    pub shutdown_delay: Duration,
    /// Required when `CustomScript` is enabled.
    pub custom_script_path: Option<PathBuf>,
    pub execute_in_parallel: bool,
}

impl Default for SecurityActionConfiguration {
    fn default() -> Self {
        Self {
            enabled_actions: vec![SecurityActionType::LockScreen],
            action_delay: Duration::ZERO,
            action_spacing: Duration::ZERO,
            alarm_volume: 1.0,
            shutdown_delay: Duration::from_secs(30),
            custom_script_path: None,
            execute_in_parallel: false,
        }
    }
}

impl SecurityActionConfiguration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.enabled_actions.is_empty() {
            return Err(ConfigurationError::invalid(
                "enabled_actions must contain at least one action",
            ));
        }

        for (i, a) in self.enabled_actions.iter().enumerate() {
            if self.enabled_actions[..i].contains(a) {
                return Err(ConfigurationError::invalid(format!(
                    "enabled_actions lists {a} more than once"
                )));
            }
        }

        if !self.alarm_volume.is_finite() || !(0.0..=1.0).contains(&self.alarm_volume) {
            return Err(ConfigurationError::invalid(format!(
                "alarm_volume must be within [0, 1], got {}",
                self.alarm_volume
            )));
        }

        if self.is_enabled(SecurityActionType::CustomScript) {
            match &self.custom_script_path {
                Some(p) if !p.as_os_str().is_empty() => {}
                _ => {
                    return Err(ConfigurationError::invalid(
                        "custom_script_path is required when customScript is enabled",
                    ))
                }
            }
        }

        Ok(())
    }

    pub fn is_enabled(&self, action: SecurityActionType) -> bool {
        self.enabled_actions.contains(&action)
    }

    /// Enabled actions in execution order.
    pub fn ordered_actions(&self) -> Vec<SecurityActionType> {
        execution_order(&self.enabled_actions)
    }
}
