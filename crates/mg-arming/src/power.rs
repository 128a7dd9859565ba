use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation from the power source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    pub adapter_connected: bool,
    pub battery_percent: Option<u8>,
    pub observed_at: DateTime<Utc>,
}

impl PowerSnapshot {
    pub fn now(adapter_connected: bool) -> Self {
        Self {
            adapter_connected,
            battery_percent: None,
            observed_at: Utc::now(),
        }
    }
}

/// An edge between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerTransition {
    Connected,
    Disconnected,
}

/// Derives edges from a snapshot sequence.
///
/// The first snapshot only establishes the baseline; repeated snapshots with
/// the same adapter state produce nothing.
#[derive(Debug, Default, Clone)]
pub struct PowerTracker {
    last_connected: Option<bool>,
}

impl PowerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: &PowerSnapshot) -> Option<PowerTransition> {
        let prev = self.last_connected.replace(snapshot.adapter_connected)?;
        match (prev, snapshot.adapter_connected) {
            (true, false) => Some(PowerTransition::Disconnected),
            (false, true) => Some(PowerTransition::Connected),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> Option<bool> {
        self.last_connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_snapshot_is_baseline_only() {
        let mut t = PowerTracker::new();
        assert_eq!(t.observe(&PowerSnapshot::now(false)), None);
        assert_eq!(t.is_connected(), Some(false));
    }

    #[test]
    fn edges_are_derived_from_consecutive_snapshots() {
        let mut t = PowerTracker::new();
        let seq = [true, true, false, false, true];
        let edges: Vec<_> = seq
            .iter()
            .map(|c| t.observe(&PowerSnapshot::now(*c)))
            .collect();
        assert_eq!(
            edges,
            vec![
                None,
                None,
                Some(PowerTransition::Disconnected),
                None,
                Some(PowerTransition::Connected),
            ]
        );
    }
}
