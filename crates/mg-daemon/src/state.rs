//! Shared runtime state for mg-daemon.
//!
//! Handlers receive `State<Arc<DaemonState>>` from Axum. The arm state itself
//! lives in the [`ArmController`]; everything here is a handle onto the core
//! plus the SSE bus.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mg_arming::ArmController;
use mg_autoarm::{AutoArmManager, ChannelLocationMonitor, ChannelNetworkMonitor};
use mg_config::ValidatedConfig;
use mg_execution::{SecurityActionExecutionEngine, SecurityActionExecutionResult, SecurityActionRepository};
use mg_protection::ResourceProtector;
use mg_schemas::{AppState, Notification, Notifier};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::auth::PassphraseAuthenticator;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(Box<StatusSnapshot>),
    Notification { notification: Notification },
    LogLine { level: String, msg: String },
}

/// Forwards core notifications onto the bus. Never blocks; a bus without
/// subscribers drops them.
pub struct BusNotifier {
    bus: broadcast::Sender<BusMsg>,
}

impl BusNotifier {
    pub fn new(bus: broadcast::Sender<BusMsg>) -> Self {
        Self { bus }
    }
}

impl Notifier for BusNotifier {
    fn notify(&self, notification: Notification) {
        let _ = self.bus.send(BusMsg::Notification { notification });
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view returned by GET /v1/status and carried inside SSE
/// `status` events.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub state: AppState,
    pub transition_epoch: u64,
    pub grace_remaining_secs: Option<f64>,
    pub executing: bool,
    pub protection_enabled: bool,
    pub auto_arm_enabled: bool,
    pub auto_arm_pending: bool,
    pub auto_arm_disabled_for_secs: Option<u64>,
    pub config_hash: Option<String>,
    pub last_execution: Option<SecurityActionExecutionResult>,
}

// ---------------------------------------------------------------------------
// DaemonState
// ---------------------------------------------------------------------------

pub struct DaemonState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub controller: ArmController,
    pub autoarm: AutoArmManager,
    pub protector: Arc<ResourceProtector>,
    pub authenticator: PassphraseAuthenticator,
    pub location_monitor: Arc<ChannelLocationMonitor>,
    pub network_monitor: Arc<ChannelNetworkMonitor>,
    /// Hash of the effective layered config; `None` when running on defaults.
    pub config_hash: Option<String>,
}

impl DaemonState {
    /// Wire the core from a validated config. Boots Disarmed.
    pub async fn build(
        config: ValidatedConfig,
        repository: Arc<dyn SecurityActionRepository>,
        passphrase: Option<String>,
        config_hash: Option<String>,
    ) -> anyhow::Result<Self> {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let notifier: Arc<dyn Notifier> = Arc::new(BusNotifier::new(bus.clone()));

        let protector = Arc::new(ResourceProtector::new(&config.protection));
        let engine = Arc::new(SecurityActionExecutionEngine::new(
            repository,
            Arc::clone(&protector),
        ));
        let controller = ArmController::new(
            config.arming,
            config.actions,
            engine,
            Arc::clone(&notifier),
        )
        .context("action configuration rejected")?;

        let autoarm = AutoArmManager::new(controller.clone(), config.auto_arm, notifier);
        for loc in config.trusted_locations {
            autoarm
                .upsert_trusted_location(loc)
                .await
                .context("trusted location rejected")?;
        }
        for net in config.trusted_networks {
            autoarm
                .add_trusted_network(net)
                .await
                .context("trusted network rejected")?;
        }

        let location_monitor = Arc::new(ChannelLocationMonitor::new("location"));
        let network_monitor = Arc::new(ChannelNetworkMonitor::new("network"));
        autoarm
            .start(location_monitor.clone(), network_monitor.clone())
            .await
            .context("auto-arm monitors failed to start")?;

        Ok(Self {
            bus,
            build: BuildInfo {
                service: "mg-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            controller,
            autoarm,
            protector,
            authenticator: PassphraseAuthenticator::new(passphrase),
            location_monitor,
            network_monitor,
            config_hash,
        })
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let auto_arm = self.autoarm.configuration().await;
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            state: self.controller.state(),
            transition_epoch: self.controller.transition_epoch(),
            grace_remaining_secs: self
                .controller
                .grace_period_remaining()
                .await
                .map(|d| d.as_secs_f64()),
            executing: self.controller.engine().is_executing(),
            protection_enabled: self.protector.is_enabled(),
            auto_arm_enabled: auto_arm.is_enabled,
            auto_arm_pending: self.autoarm.has_pending_arm().await,
            auto_arm_disabled_for_secs: self
                .autoarm
                .decision_engine()
                .disabled_for()
                .await
                .map(|d| d.as_secs()),
            config_hash: self.config_hash.clone(),
            last_execution: self.controller.last_execution_result().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Emit a heartbeat on the bus every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Publish a status snapshot on the bus after every arm state transition.
pub fn spawn_state_relay(state: Arc<DaemonState>) {
    let mut rx = state.controller.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snap = state.snapshot().await;
            let _ = state.bus.send(BusMsg::Status(Box::new(snap)));
        }
    });
}
