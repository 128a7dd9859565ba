use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mg_protection::ProtectionError;
use mg_schemas::{SecurityActionConfiguration, SecurityActionType};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::ActionExecutionError;

// ---------------------------------------------------------------------------
// ExecutionError
// ---------------------------------------------------------------------------

/// Why a single action did not run to success.
///
/// Collected per action into the execution result; one failing action never
/// aborts the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Another run was in flight; nothing was executed.
    AlreadyExecuting,
    /// Admission control refused the attempt (rate limit, open circuit,
    /// protection disabled).
    Protection(ProtectionError),
    /// The effect itself failed.
    ActionFailed(ActionExecutionError),
}

impl ExecutionError {
    /// `true` when the action was refused before it ran, as opposed to
    /// running and failing. Callers use this to pick "too many attempts"
    /// messaging over "action failed".
    pub fn is_protection_rejection(&self) -> bool {
        matches!(self, ExecutionError::Protection(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::AlreadyExecuting => "already_executing",
            ExecutionError::Protection(ProtectionError::RateLimited { .. }) => "rate_limited",
            ExecutionError::Protection(ProtectionError::CircuitOpen { .. }) => "circuit_open",
            ExecutionError::Protection(ProtectionError::ProtectionDisabled) => "protection_disabled",
            ExecutionError::ActionFailed(_) => "action_failed",
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::AlreadyExecuting => {
                write!(f, "EXECUTION_IN_PROGRESS: security actions already executing")
            }
            ExecutionError::Protection(e) => write!(f, "{e}"),
            ExecutionError::ActionFailed(e) => write!(f, "ACTION_FAILED: {e}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<ProtectionError> for ExecutionError {
    fn from(e: ProtectionError) -> Self {
        ExecutionError::Protection(e)
    }
}

impl From<ActionExecutionError> for ExecutionError {
    fn from(e: ActionExecutionError) -> Self {
        ExecutionError::ActionFailed(e)
    }
}

impl Serialize for ExecutionError {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut st = s.serialize_struct("ExecutionError", 2)?;
        st.serialize_field("code", self.code())?;
        st.serialize_field("message", &self.to_string())?;
        st.end()
    }
}

// ---------------------------------------------------------------------------
// Request / results
// ---------------------------------------------------------------------------

/// Stops one run from starting any further action.
///
/// Clones share the signal. Aborting interrupts the pre-run delay and the
/// pause between sequential actions; an action already executing finishes.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// `true` if this call did the aborting.
    pub fn abort(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`AbortSignal::abort`] has been called.
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            // The sender lives as long as `self`; the channel cannot close.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `d` unless aborted first. `false` when aborted.
    pub async fn sleep(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.is_aborted();
        }
        tokio::select! {
            _ = self.aborted() => false,
            _ = tokio::time::sleep(d) => !self.is_aborted(),
        }
    }
}

/// One request to run the configured response.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub request_id: Uuid,
    pub configuration: SecurityActionConfiguration,
    pub requested_at: DateTime<Utc>,
    #[serde(skip)]
    pub abort: AbortSignal,
}

impl ExecutionRequest {
    pub fn new(configuration: SecurityActionConfiguration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            configuration,
            requested_at: Utc::now(),
            abort: AbortSignal::new(),
        }
    }
}

/// Outcome of one action. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityActionResult {
    pub action_type: SecurityActionType,
    pub success: bool,
    pub error: Option<ExecutionError>,
    pub executed_at: DateTime<Utc>,
}

impl SecurityActionResult {
    pub fn from_outcome(action_type: SecurityActionType, outcome: Result<(), ExecutionError>) -> Self {
        Self {
            action_type,
            success: outcome.is_ok(),
            error: outcome.err(),
            executed_at: Utc::now(),
        }
    }
}

/// Outcome of one run. Produced once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityActionExecutionResult {
    pub request: ExecutionRequest,
    /// One entry per executed action, in execution order.
    pub results: Vec<SecurityActionResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// The run was aborted; `results` covers only the actions that ran.
    pub aborted: bool,
}

impl SecurityActionExecutionResult {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.failed() == 0
    }

    /// `true` when this result is the single `AlreadyExecuting` rejection.
    pub fn was_rejected_as_duplicate(&self) -> bool {
        matches!(
            self.results.as_slice(),
            [SecurityActionResult {
                error: Some(ExecutionError::AlreadyExecuting),
                ..
            }]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protection_rejections_are_distinguishable_from_failures() {
        let limited = ExecutionError::from(ProtectionError::RateLimited {
            action: SecurityActionType::Shutdown,
            retry_after: Duration::from_secs(3),
        });
        let failed = ExecutionError::from(ActionExecutionError::Platform("no session".into()));

        assert!(limited.is_protection_rejection());
        assert!(!failed.is_protection_rejection());
        assert_eq!(limited.code(), "rate_limited");
        assert_eq!(failed.code(), "action_failed");
        assert!(!ExecutionError::AlreadyExecuting.is_protection_rejection());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_interrupts_sleep_once() {
        let signal = AbortSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.sleep(Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(signal.abort());
        assert!(!signal.abort());
        assert!(!waiter.await.unwrap());
        assert!(!signal.sleep(Duration::ZERO).await);
    }

    #[test]
    fn execution_error_serializes_code_and_message() {
        let v = serde_json::to_value(ExecutionError::AlreadyExecuting).unwrap();
        assert_eq!(v["code"], "already_executing");
        assert!(v["message"].as_str().unwrap().contains("already executing"));
    }
}
