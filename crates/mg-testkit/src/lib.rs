//! Test doubles and wiring helpers shared by the cross-crate scenarios.
//!
//! Nothing here touches the OS. Scenario tests under `tests/` build a
//! [`GuardHarness`], drive the controller, and assert on what the recording
//! doubles saw.

mod recording;

pub use recording::{RecordedCall, RecordingActionRepository, RecordingNotifier};

use std::sync::Arc;

use mg_arming::{ArmController, ArmError, PowerSnapshot};
use mg_execution::SecurityActionExecutionEngine;
use mg_protection::{ProtectionPolicies, ResourceProtector};
use mg_schemas::{ArmingConfiguration, AuthOutcome, SecurityActionConfiguration};

/// A fully wired controller over recording doubles.
pub struct GuardHarness {
    pub controller: ArmController,
    pub engine: Arc<SecurityActionExecutionEngine>,
    pub protector: Arc<ResourceProtector>,
    pub repository: Arc<RecordingActionRepository>,
    pub notifier: Arc<RecordingNotifier>,
}

impl GuardHarness {
    /// Default protection policies.
    pub fn new(
        arming: ArmingConfiguration,
        actions: SecurityActionConfiguration,
        repository: RecordingActionRepository,
    ) -> Result<Self, ArmError> {
        Self::with_policies(arming, actions, repository, &ProtectionPolicies::default())
    }

    pub fn with_policies(
        arming: ArmingConfiguration,
        actions: SecurityActionConfiguration,
        repository: RecordingActionRepository,
        policies: &ProtectionPolicies,
    ) -> Result<Self, ArmError> {
        let repository = Arc::new(repository);
        let notifier = Arc::new(RecordingNotifier::new());
        let protector = Arc::new(ResourceProtector::new(policies));
        let engine = Arc::new(SecurityActionExecutionEngine::new(
            repository.clone(),
            Arc::clone(&protector),
        ));
        let controller = ArmController::new(arming, actions, engine.clone(), notifier.clone())?;
        Ok(Self {
            controller,
            engine,
            protector,
            repository,
            notifier,
        })
    }

    /// Disarmed → Armed with a connected adapter as the power baseline.
    pub async fn arm_on_power(&self) -> Result<(), ArmError> {
        self.controller.arm(AuthOutcome::Authenticated).await?;
        self.plug_in().await;
        Ok(())
    }

    pub async fn unplug(&self) {
        self.controller
            .handle_power_snapshot(&PowerSnapshot::now(false))
            .await;
    }

    pub async fn plug_in(&self) {
        self.controller
            .handle_power_snapshot(&PowerSnapshot::now(true))
            .await;
    }
}

/// `actions` in the given order, everything else default.
pub fn actions(list: &[mg_schemas::SecurityActionType]) -> SecurityActionConfiguration {
    SecurityActionConfiguration {
        enabled_actions: list.to_vec(),
        ..Default::default()
    }
}
