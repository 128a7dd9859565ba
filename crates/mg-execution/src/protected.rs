use std::sync::Arc;

use mg_protection::ResourceProtector;
use mg_schemas::{SecurityActionConfiguration, SecurityActionType};
use tracing::{info, warn};

use crate::{ActionExecutionError, ExecutionError, SecurityActionRepository};

/// Runs one action through the resource protector.
///
/// Every call is admission-checked first. Admitted calls always report their
/// outcome back to the protector, so breaker bookkeeping cannot be skipped by
/// a caller. Rejected calls never reach the repository.
pub struct ProtectedActionExecutor {
    repository: Arc<dyn SecurityActionRepository>,
    protector: Arc<ResourceProtector>,
}

impl ProtectedActionExecutor {
    pub fn new(
        repository: Arc<dyn SecurityActionRepository>,
        protector: Arc<ResourceProtector>,
    ) -> Self {
        Self {
            repository,
            protector,
        }
    }

    pub async fn execute(
        &self,
        action: SecurityActionType,
        cfg: &SecurityActionConfiguration,
    ) -> Result<(), ExecutionError> {
        self.protector.check_action(action).await?;

        match self.perform(action, cfg).await {
            Ok(()) => {
                self.protector.record_success(action).await;
                info!(action = %action, "security action executed");
                Ok(())
            }
            Err(e) => {
                self.protector.record_failure(action).await;
                warn!(action = %action, error = %e, "security action failed");
                Err(ExecutionError::ActionFailed(e))
            }
        }
    }

    /// Best-effort stop of repeating effects. Not gated: stopping is always
    /// allowed.
    pub async fn stop_alarm(&self) -> Result<(), ActionExecutionError> {
        self.repository.stop_alarm().await
    }

    pub fn protector(&self) -> &Arc<ResourceProtector> {
        &self.protector
    }

    async fn perform(
        &self,
        action: SecurityActionType,
        cfg: &SecurityActionConfiguration,
    ) -> Result<(), ActionExecutionError> {
        match action {
            SecurityActionType::LockScreen => self.repository.lock_screen().await,
            SecurityActionType::SoundAlarm => self.repository.play_alarm(cfg.alarm_volume).await,
            SecurityActionType::ForceLogout => self.repository.force_logout().await,
            SecurityActionType::Shutdown => {
                self.repository
                    .schedule_shutdown(cfg.shutdown_delay.as_secs())
                    .await
            }
            SecurityActionType::CustomScript => match &cfg.custom_script_path {
                Some(path) => self.repository.execute_script(path).await,
                // Validation rejects this configuration; report rather than panic.
                None => Err(ActionExecutionError::ScriptNotFound(Default::default())),
            },
        }
    }
}
