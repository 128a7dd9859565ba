//! Request and response types for all mg-daemon HTTP endpoints.
//!
//! No business logic lives here.

use mg_arming::PowerTransition;
use mg_protection::{CircuitState, ProtectionMetrics};
use mg_schemas::{AppState, SecurityActionType};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable, e.g. `auth_failed`, `invalid_transition`.
    pub code: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// /v1/arm  /v1/disarm  /v1/grace/cancel
// ---------------------------------------------------------------------------

/// A missing passphrase counts as the user cancelling the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRequest {
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub state: AppState,
    pub transition_epoch: u64,
}

// ---------------------------------------------------------------------------
// /v1/power
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerRequest {
    pub adapter_connected: bool,
    #[serde(default)]
    pub battery_percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerResponse {
    /// `None` for the baseline snapshot and for repeats.
    pub transition: Option<PowerTransition>,
    pub state: AppState,
}

// ---------------------------------------------------------------------------
// /v1/actions/stop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopActionsResponse {
    pub executing: bool,
}

// ---------------------------------------------------------------------------
// /v1/protection/:action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionStatusResponse {
    pub action: SecurityActionType,
    pub enabled: bool,
    pub circuit_state: CircuitState,
    pub available_tokens: f64,
    pub success_rate: f64,
    pub metrics: ProtectionMetrics,
}

// ---------------------------------------------------------------------------
// /v1/autoarm/*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoArmDisableRequest {
    pub minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoArmStatusResponse {
    pub enabled: bool,
    pub disabled_for_secs: Option<u64>,
    pub pending_arm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequest {
    /// `None` when not associated with any network.
    #[serde(default)]
    pub ssid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationResponse {
    /// False when the matching monitor is not running.
    pub accepted: bool,
}
