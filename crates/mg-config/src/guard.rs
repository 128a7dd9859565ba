use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use mg_autoarm::{TrustedLocation, TrustedNetwork};
use mg_protection::{CircuitBreakerConfig, ProtectionPolicies, ProtectionPolicy, RateLimitConfig};
use mg_schemas::{
    ArmingConfiguration, AutoArmConfiguration, ConfigurationError, SecurityActionConfiguration,
    SecurityActionType,
};
use serde::{Deserialize, Serialize};

/// Typed mirror of the YAML tree. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub arming: ArmingSection,
    pub actions: ActionsSection,
    pub auto_arm: AutoArmSection,
    pub protection: ProtectionSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmingSection {
    /// 0 disables the grace period; other values are clamped to 5..=30.
    pub grace_period_secs: f64,
    pub allow_grace_period_cancellation: bool,
    pub require_auth_to_disarm: bool,
}

impl Default for ArmingSection {
    fn default() -> Self {
        Self {
            grace_period_secs: 10.0,
            allow_grace_period_cancellation: true,
            require_auth_to_disarm: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsSection {
    /// Wire names, e.g. `lockScreen`.
    pub enabled: Vec<String>,
    pub action_delay_secs: f64,
    /// Pause between sequential actions.
    pub action_spacing_secs: f64,
    pub alarm_volume: f32,
    pub shutdown_delay_secs: f64,
    pub custom_script_path: Option<PathBuf>,
    pub execute_in_parallel: bool,
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            enabled: vec![SecurityActionType::LockScreen.as_str().to_string()],
            action_delay_secs: 0.0,
            action_spacing_secs: 0.0,
            alarm_volume: 1.0,
            shutdown_delay_secs: 30.0,
            custom_script_path: None,
            execute_in_parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoArmSection {
    pub enabled: bool,
    pub arm_by_location: bool,
    pub arm_on_untrusted_network: bool,
    pub cooldown_secs: f64,
    pub notify_before_arming: bool,
    pub notification_delay_secs: f64,
    pub trusted_locations: Vec<TrustedLocation>,
    pub trusted_networks: Vec<String>,
}

impl Default for AutoArmSection {
    fn default() -> Self {
        Self {
            enabled: false,
            arm_by_location: true,
            arm_on_untrusted_network: true,
            cooldown_secs: 60.0,
            notify_before_arming: true,
            notification_delay_secs: 5.0,
            trusted_locations: Vec::new(),
            trusted_networks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionSection {
    pub enabled: bool,
    /// Keyed by action wire name. Unlisted actions keep built-in defaults.
    pub actions: BTreeMap<String, ActionProtectionSection>,
}

impl Default for ProtectionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            actions: BTreeMap::new(),
        }
    }
}

/// Overrides for one action. Omitted halves keep the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionProtectionSection {
    pub rate_limit: Option<RateLimitSection>,
    pub circuit_breaker: Option<CircuitBreakerSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSection {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSection {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: f64,
}

/// Every domain configuration the daemon needs, all validated together.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub arming: ArmingConfiguration,
    pub actions: SecurityActionConfiguration,
    pub auto_arm: AutoArmConfiguration,
    pub protection: ProtectionPolicies,
    pub trusted_locations: Vec<TrustedLocation>,
    pub trusted_networks: Vec<TrustedNetwork>,
}

fn secs(field: &str, v: f64) -> Result<Duration, ConfigurationError> {
    if !v.is_finite() || v < 0.0 {
        return Err(ConfigurationError::invalid(format!(
            "{field} must be a non-negative number, got {v}"
        )));
    }
    Duration::try_from_secs_f64(v).map_err(|_| {
        ConfigurationError::invalid(format!("{field} is too large, got {v}"))
    })
}

fn parse_action(field: &str, name: &str) -> Result<SecurityActionType, ConfigurationError> {
    SecurityActionType::parse(name)
        .ok_or_else(|| ConfigurationError::invalid(format!("{field}: unknown action '{name}'")))
}

fn prefixed(prefix: &str) -> impl Fn(ConfigurationError) -> ConfigurationError + '_ {
    move |ConfigurationError::Invalid(r)| ConfigurationError::invalid(format!("{prefix}: {r}"))
}

impl GuardConfig {
    /// Convert into domain configurations. The first invalid field rejects
    /// the whole config; nothing is partially applied.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigurationError> {
        let arming = ArmingConfiguration::from_grace_secs(
            self.arming.grace_period_secs,
            self.arming.allow_grace_period_cancellation,
            self.arming.require_auth_to_disarm,
        )
        .map_err(prefixed("arming"))?;

        let a = &self.actions;
        let actions = SecurityActionConfiguration {
            enabled_actions: a
                .enabled
                .iter()
                .map(|n| parse_action("actions.enabled", n))
                .collect::<Result<_, _>>()?,
            action_delay: secs("actions.action_delay_secs", a.action_delay_secs)?,
            action_spacing: secs("actions.action_spacing_secs", a.action_spacing_secs)?,
            alarm_volume: a.alarm_volume,
            shutdown_delay: secs("actions.shutdown_delay_secs", a.shutdown_delay_secs)?,
            custom_script_path: a.custom_script_path.clone(),
            execute_in_parallel: a.execute_in_parallel,
        };
        actions.validate().map_err(prefixed("actions"))?;

        let aa = &self.auto_arm;
        let auto_arm = AutoArmConfiguration {
            is_enabled: aa.enabled,
            arm_by_location: aa.arm_by_location,
            arm_on_untrusted_network: aa.arm_on_untrusted_network,
            cooldown_period: secs("auto_arm.cooldown_secs", aa.cooldown_secs)?,
            notify_before_arming: aa.notify_before_arming,
            notification_delay: secs("auto_arm.notification_delay_secs", aa.notification_delay_secs)?,
        };
        for loc in &aa.trusted_locations {
            loc.validate().map_err(prefixed("auto_arm.trusted_locations"))?;
        }
        let mut trusted_networks = Vec::new();
        for ssid in &aa.trusted_networks {
            if ssid.is_empty() {
                return Err(ConfigurationError::invalid(
                    "auto_arm.trusted_networks: ssid must not be empty",
                ));
            }
            trusted_networks.push(TrustedNetwork::new(ssid.clone()));
        }

        let mut protection = ProtectionPolicies {
            enabled: self.protection.enabled,
            ..Default::default()
        };
        for (name, section) in &self.protection.actions {
            let action = parse_action("protection.actions", name)?;
            let mut policy = ProtectionPolicy::default_for(action);
            if let Some(rl) = section.rate_limit {
                policy.rate_limit = RateLimitConfig::new(rl.capacity, rl.refill_per_sec);
            }
            if let Some(cb) = section.circuit_breaker {
                let field = format!("protection.{action}.circuit_breaker.timeout_secs");
                policy.circuit_breaker = CircuitBreakerConfig::new(
                    cb.failure_threshold,
                    cb.success_threshold,
                    secs(&field, cb.timeout_secs)?,
                );
            }
            protection.per_action.insert(action, policy);
        }
        protection.validate()?;

        Ok(ValidatedConfig {
            arming,
            actions,
            auto_arm,
            protection,
            trusted_locations: aa.trusted_locations.clone(),
            trusted_networks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let v = GuardConfig::default().validate().unwrap();
        assert_eq!(v.arming, ArmingConfiguration::default());
        assert_eq!(v.actions, SecurityActionConfiguration::default());
        assert_eq!(v.auto_arm, AutoArmConfiguration::default());
        assert_eq!(v.protection, ProtectionPolicies::default());
    }

    #[test]
    fn grace_period_is_clamped() {
        let mut c = GuardConfig::default();
        c.arming.grace_period_secs = 120.0;
        assert_eq!(c.validate().unwrap().arming.grace_period, Duration::from_secs(30));
        c.arming.grace_period_secs = 1.0;
        assert_eq!(c.validate().unwrap().arming.grace_period, Duration::from_secs(5));
        c.arming.grace_period_secs = 0.0;
        assert!(!c.validate().unwrap().arming.has_grace_period());
    }

    #[test]
    fn unknown_action_names_are_rejected() {
        let mut c = GuardConfig::default();
        c.actions.enabled = vec!["lockScreen".into(), "selfDestruct".into()];
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("selfDestruct"));
    }

    #[test]
    fn protection_override_keeps_other_half_default() {
        let mut c = GuardConfig::default();
        c.protection.actions.insert(
            "shutdown".into(),
            ActionProtectionSection {
                rate_limit: Some(RateLimitSection {
                    capacity: 2,
                    refill_per_sec: 0.5,
                }),
                circuit_breaker: None,
            },
        );
        let p = c.validate().unwrap().protection.policy(SecurityActionType::Shutdown);
        assert_eq!(p.rate_limit, RateLimitConfig::new(2, 0.5));
        assert_eq!(
            p.circuit_breaker,
            ProtectionPolicy::default_for(SecurityActionType::Shutdown).circuit_breaker
        );
    }

    #[test]
    fn zero_capacity_rejects_whole_config() {
        let mut c = GuardConfig::default();
        c.protection.actions.insert(
            "lockScreen".into(),
            ActionProtectionSection {
                rate_limit: Some(RateLimitSection {
                    capacity: 0,
                    refill_per_sec: 1.0,
                }),
                circuit_breaker: None,
            },
        );
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("protection.lockScreen"));
    }

    #[test]
    fn oversized_durations_are_rejected_not_panicking() {
        let mut c = GuardConfig::default();
        c.actions.action_delay_secs = 1e20;
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("actions.action_delay_secs"));

        let mut c = GuardConfig::default();
        c.auto_arm.cooldown_secs = 1e30;
        assert!(c.validate().is_err());

        let mut c = GuardConfig::default();
        c.arming.grace_period_secs = 1e30;
        assert_eq!(c.validate().unwrap().arming.grace_period, Duration::from_secs(30));
    }

    #[test]
    fn action_spacing_reaches_the_action_configuration() {
        let mut c = GuardConfig::default();
        c.actions.action_spacing_secs = 2.5;
        assert_eq!(
            c.validate().unwrap().actions.action_spacing,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn negative_durations_are_rejected() {
        let mut c = GuardConfig::default();
        c.auto_arm.cooldown_secs = -1.0;
        assert!(c.validate().is_err());
    }
}
