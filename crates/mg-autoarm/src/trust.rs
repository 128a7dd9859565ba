//! Trusted locations and networks.
//!
//! Registries turn raw observations into [`AutoArmTrigger`]s. They are plain
//! structs; the owner serializes access.

use chrono::{DateTime, Utc};
use mg_schemas::{AutoArmTrigger, ConfigurationError};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl LocationFix {
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            observed_at: Utc::now(),
        }
    }
}

/// A circular geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

impl TrustedLocation {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Self, ConfigurationError> {
        let loc = Self {
            name: name.into(),
            latitude,
            longitude,
            radius_m,
        };
        loc.validate()?;
        Ok(loc)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::invalid("trusted location name must not be empty"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigurationError::invalid(format!(
                "trusted location '{}': latitude {} out of range",
                self.name, self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigurationError::invalid(format!(
                "trusted location '{}': longitude {} out of range",
                self.name, self.longitude
            )));
        }
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            return Err(ConfigurationError::invalid(format!(
                "trusted location '{}': radius must be positive",
                self.name
            )));
        }
        Ok(())
    }

    /// Great-circle distance to `(latitude, longitude)` in metres.
    pub fn distance_m(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_m(self.latitude, self.longitude, latitude, longitude)
    }

    pub fn contains(&self, fix: &LocationFix) -> bool {
        self.distance_m(fix.latitude, fix.longitude) <= self.radius_m
    }
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Trusted geofences plus the last known containment.
#[derive(Debug, Default, Clone)]
pub struct LocationTrustRegistry {
    locations: Vec<TrustedLocation>,
    /// `None` before the first fix; `Some(None)` when outside every fence.
    inside: Option<Option<String>>,
}

impl LocationTrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name.
    pub fn upsert(&mut self, location: TrustedLocation) -> Result<(), ConfigurationError> {
        location.validate()?;
        match self.locations.iter_mut().find(|l| l.name == location.name) {
            Some(existing) => *existing = location,
            None => self.locations.push(location),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.locations.len();
        self.locations.retain(|l| l.name != name);
        self.locations.len() != before
    }

    pub fn list(&self) -> &[TrustedLocation] {
        &self.locations
    }

    pub fn get(&self, name: &str) -> Option<&TrustedLocation> {
        self.locations.iter().find(|l| l.name == name)
    }

    pub fn containing(&self, fix: &LocationFix) -> Option<&TrustedLocation> {
        self.locations.iter().find(|l| l.contains(fix))
    }

    /// Feed one fix.
    ///
    /// - leaving a trusted fence for untrusted ground → `LeftTrustedLocation(name)`
    /// - first fix outside every fence → `EnteredUntrustedLocation`
    /// - anything else → `None`
    pub fn observe(&mut self, fix: &LocationFix) -> Option<AutoArmTrigger> {
        let now_inside = self.containing(fix).map(|l| l.name.clone());
        let prev = self.inside.replace(now_inside.clone());
        match (prev, now_inside) {
            (None, None) => Some(AutoArmTrigger::EnteredUntrustedLocation),
            (Some(Some(left)), None) => Some(AutoArmTrigger::LeftTrustedLocation(left)),
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.inside.as_ref().and_then(|n| n.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustedNetwork {
    pub ssid: String,
}

impl TrustedNetwork {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self { ssid: ssid.into() }
    }
}

/// The Wi-Fi association reported by the platform. `ssid == None` means not
/// associated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkObservation {
    pub ssid: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl NetworkObservation {
    pub fn now(ssid: Option<&str>) -> Self {
        Self {
            ssid: ssid.map(str::to_owned),
            observed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct NetworkTrustRegistry {
    networks: Vec<TrustedNetwork>,
    /// `None` before the first observation.
    current: Option<Option<String>>,
}

impl NetworkTrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, network: TrustedNetwork) -> Result<(), ConfigurationError> {
        if network.ssid.is_empty() {
            return Err(ConfigurationError::invalid("trusted network ssid must not be empty"));
        }
        if !self.is_trusted(&network.ssid) {
            self.networks.push(network);
        }
        Ok(())
    }

    pub fn remove(&mut self, ssid: &str) -> bool {
        let before = self.networks.len();
        self.networks.retain(|n| n.ssid != ssid);
        self.networks.len() != before
    }

    pub fn list(&self) -> &[TrustedNetwork] {
        &self.networks
    }

    pub fn is_trusted(&self, ssid: &str) -> bool {
        self.networks.iter().any(|n| n.ssid == ssid)
    }

    /// Feed one observation.
    ///
    /// - joining an untrusted SSID (including on the first observation) →
    ///   `UntrustedNetwork(ssid)`
    /// - dropping off a trusted SSID with no new association →
    ///   `LostTrustedNetwork(ssid)`
    /// - repeats and joins of trusted SSIDs → `None`
    pub fn observe(&mut self, observation: &NetworkObservation) -> Option<AutoArmTrigger> {
        let next = observation.ssid.clone();
        let prev = self.current.replace(next.clone());
        if prev.as_ref() == Some(&next) {
            return None;
        }
        match next {
            Some(ssid) if !self.is_trusted(&ssid) => Some(AutoArmTrigger::UntrustedNetwork(ssid)),
            Some(_) => None,
            None => match prev.flatten() {
                Some(old) if self.is_trusted(&old) => Some(AutoArmTrigger::LostTrustedNetwork(old)),
                _ => None,
            },
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().and_then(|s| s.as_deref())
    }
}
