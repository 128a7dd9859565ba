//! Auto-arm runner.
//!
//! # Invariants
//!
//! - At most one deferred arm is pending; a newer one replaces (and cancels)
//!   the older.
//! - A deferred arm lands only if the controller saw no transition since the
//!   decision was taken. Any arm/disarm/trigger in between voids it.
//! - Monitors are started only for the signal kinds the configuration
//!   enables.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use mg_arming::{ArmController, Countdown, CountdownOutcome};
use mg_schemas::{AutoArmConfiguration, AutoArmTrigger, Notification, Notifier};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    AutoArmDecision, AutoArmDecisionEngine, AutoArmEvent, LocationMonitor, LocationTrustRegistry,
    MonitorError, NetworkMonitor, NetworkTrustRegistry, TrustedLocation, TrustedNetwork,
};

#[derive(Default)]
struct Running {
    location: Option<Arc<dyn LocationMonitor>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    controller: ArmController,
    engine: AutoArmDecisionEngine,
    notifier: Arc<dyn Notifier>,
    configuration: Mutex<AutoArmConfiguration>,
    locations: Mutex<LocationTrustRegistry>,
    networks: Mutex<NetworkTrustRegistry>,
    pending: Mutex<Option<Countdown>>,
    running: Mutex<Running>,
}

#[derive(Clone)]
pub struct AutoArmManager {
    shared: Arc<Shared>,
}

impl AutoArmManager {
    pub fn new(
        controller: ArmController,
        configuration: AutoArmConfiguration,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let engine = AutoArmDecisionEngine::new(controller.subscribe());
        Self {
            shared: Arc::new(Shared {
                controller,
                engine,
                notifier,
                configuration: Mutex::new(configuration),
                locations: Mutex::new(LocationTrustRegistry::new()),
                networks: Mutex::new(NetworkTrustRegistry::new()),
                pending: Mutex::new(None),
                running: Mutex::new(Running::default()),
            }),
        }
    }

    pub fn decision_engine(&self) -> &AutoArmDecisionEngine {
        &self.shared.engine
    }

    pub async fn configuration(&self) -> AutoArmConfiguration {
        self.shared.configuration.lock().await.clone()
    }

    /// Takes effect for the next event. Monitors already running are not
    /// restarted.
    pub async fn update_configuration(&self, configuration: AutoArmConfiguration) {
        *self.shared.configuration.lock().await = configuration;
        info!("auto-arm configuration updated");
    }

    // -----------------------------------------------------------------------
    // Trust registries
    // -----------------------------------------------------------------------

    pub async fn upsert_trusted_location(
        &self,
        location: TrustedLocation,
    ) -> Result<(), mg_schemas::ConfigurationError> {
        self.shared.locations.lock().await.upsert(location)
    }

    pub async fn remove_trusted_location(&self, name: &str) -> bool {
        self.shared.locations.lock().await.remove(name)
    }

    pub async fn trusted_locations(&self) -> Vec<TrustedLocation> {
        self.shared.locations.lock().await.list().to_vec()
    }

    pub async fn add_trusted_network(
        &self,
        network: TrustedNetwork,
    ) -> Result<(), mg_schemas::ConfigurationError> {
        self.shared.networks.lock().await.add(network)
    }

    pub async fn remove_trusted_network(&self, ssid: &str) -> bool {
        self.shared.networks.lock().await.remove(ssid)
    }

    pub async fn trusted_networks(&self) -> Vec<TrustedNetwork> {
        self.shared.networks.lock().await.list().to_vec()
    }

    // -----------------------------------------------------------------------
    // Monitoring
    // -----------------------------------------------------------------------

    /// Start the monitors the configuration enables and route their
    /// observations through the registries. No-op when auto-arm is disabled.
    pub async fn start(
        &self,
        location: Arc<dyn LocationMonitor>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Result<(), MonitorError> {
        let cfg = self.configuration().await;
        if !cfg.is_enabled {
            info!("auto-arm disabled; monitors not started");
            return Ok(());
        }

        let mut running = self.shared.running.lock().await;

        if cfg.arm_by_location && running.location.is_none() {
            let mut fixes = location.events();
            location.start_monitoring().await?;
            let this = self.clone();
            running.tasks.push(tokio::spawn(async move {
                while let Some(fix) = fixes.next().await {
                    let trigger = this.shared.locations.lock().await.observe(&fix);
                    if let Some(trigger) = trigger {
                        this.handle_trigger(trigger).await;
                    }
                }
            }));
            running.location = Some(location);
            info!("location monitoring started");
        }

        if cfg.arm_on_untrusted_network && running.network.is_none() {
            let mut observations = network.events();
            network.start_monitoring().await?;
            let this = self.clone();
            running.tasks.push(tokio::spawn(async move {
                while let Some(obs) = observations.next().await {
                    let trigger = this.shared.networks.lock().await.observe(&obs);
                    if let Some(trigger) = trigger {
                        this.handle_trigger(trigger).await;
                    }
                }
            }));
            running.network = Some(network);
            info!("network monitoring started");
        }

        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.shared.running.lock().await;
        if let Some(m) = running.location.take() {
            m.stop_monitoring().await;
        }
        if let Some(m) = running.network.take() {
            m.stop_monitoring().await;
        }
        for task in running.tasks.drain(..) {
            task.abort();
        }
        drop(running);
        self.cancel_pending_arm().await;
        info!("auto-arm monitoring stopped");
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// Evaluate one trigger and act on an Arm decision. With
    /// `notify_before_arming` the user is notified first, then the arm
    /// follows after the notification delay (immediately if it is zero).
    pub async fn handle_trigger(&self, trigger: AutoArmTrigger) -> AutoArmDecision {
        let cfg = self.configuration().await;
        let event = AutoArmEvent::new(trigger, cfg.clone());
        let decision = self.shared.engine.evaluate(&event).await;

        let AutoArmDecision::Arm { reason } = &decision else {
            return decision;
        };
        let epoch = self.shared.controller.transition_epoch();

        if cfg.notify_before_arming {
            self.shared.notifier.notify(Notification::AutoArmPending {
                reason: reason.clone(),
                delay_secs: cfg.notification_delay.as_secs(),
            });
            if !cfg.notification_delay.is_zero() {
                self.schedule_arm(reason.clone(), epoch, cfg.notification_delay)
                    .await;
                return decision;
            }
        }
        arm_now(&self.shared.controller, reason, epoch).await;
        decision
    }

    async fn schedule_arm(&self, reason: String, epoch: u64, delay: Duration) {
        let controller = self.shared.controller.clone();
        let countdown = Countdown::start(delay, move || async move {
            arm_now(&controller, &reason, epoch).await;
        });
        // Replacing drops (and so cancels) any older pending arm.
        *self.shared.pending.lock().await = Some(countdown);
        info!(delay_secs = delay.as_secs(), "auto-arm scheduled");
    }

    /// Cancel a deferred arm that has not fired yet.
    pub async fn cancel_pending_arm(&self) -> bool {
        let Some(countdown) = self.shared.pending.lock().await.take() else {
            return false;
        };
        let cancelled = countdown.cancel();
        if cancelled {
            info!("pending auto-arm cancelled");
            self.shared.notifier.notify(Notification::AutoArmCancelled);
        }
        cancelled
    }

    pub async fn has_pending_arm(&self) -> bool {
        self.shared
            .pending
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.outcome() == CountdownOutcome::Pending)
    }

    /// Suppress auto-arm for `duration` and drop any pending arm.
    pub async fn temporarily_disable(&self, duration: Duration) {
        self.shared.engine.temporarily_disable(duration).await;
        self.cancel_pending_arm().await;
    }

    pub async fn cancel_temporary_disable(&self) {
        self.shared.engine.cancel_temporary_disable().await;
    }
}

async fn arm_now(controller: &ArmController, reason: &str, epoch: u64) {
    match controller.auto_arm(reason, epoch).await {
        Ok(true) => {}
        Ok(false) => info!(reason, "auto-arm voided: state changed since decision"),
        Err(e) => warn!(error = %e, reason, "auto-arm failed"),
    }
}
