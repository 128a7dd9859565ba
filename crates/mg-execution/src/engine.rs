//! Security action execution engine.
//!
//! # Invariants
//!
//! - **Single flight.** At most one run is active. A call made while a run
//!   is active returns immediately with a single `AlreadyExecuting` entry and
//!   leaves the active run untouched.
//! - **LockScreen first.** The enabled set is always sorted with
//!   `LockScreen` ahead of every other action.
//! - **No early abort on failure.** Individual failures are collected, never
//!   propagated. Only the request's [`AbortSignal`](crate::AbortSignal) ends a
//!   run early, and only between actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use mg_protection::ResourceProtector;
use mg_schemas::SecurityActionType;
use tracing::{info, warn};

use crate::{
    ExecutionError, ExecutionRequest, ExecutionStrategy, ParallelStrategy,
    ProtectedActionExecutor, SecurityActionExecutionResult, SecurityActionRepository,
    SecurityActionResult, SequentialStrategy,
};

/// Clears the in-flight flag when the run ends, including when the run's
/// future is dropped mid-way.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SecurityActionExecutionEngine {
    executor: ProtectedActionExecutor,
    executing: AtomicBool,
    sequential: SequentialStrategy,
    parallel: ParallelStrategy,
}

impl SecurityActionExecutionEngine {
    pub fn new(
        repository: Arc<dyn SecurityActionRepository>,
        protector: Arc<ResourceProtector>,
    ) -> Self {
        Self {
            executor: ProtectedActionExecutor::new(repository, protector),
            executing: AtomicBool::new(false),
            sequential: SequentialStrategy,
            parallel: ParallelStrategy,
        }
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    pub fn protector(&self) -> &Arc<ResourceProtector> {
        self.executor.protector()
    }

    /// Run the request's configured actions.
    pub async fn execute_actions(&self, request: ExecutionRequest) -> SecurityActionExecutionResult {
        let started_at = Utc::now();

        if self
            .executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(request_id = %request.request_id, "execution already in progress; rejecting");
            let action_type = request
                .configuration
                .ordered_actions()
                .first()
                .copied()
                .unwrap_or(SecurityActionType::LockScreen);
            return SecurityActionExecutionResult {
                request,
                results: vec![SecurityActionResult::from_outcome(
                    action_type,
                    Err(ExecutionError::AlreadyExecuting),
                )],
                started_at,
                completed_at: Utc::now(),
                aborted: false,
            };
        }
        let _in_flight = InFlight(&self.executing);

        let cfg = &request.configuration;
        if !cfg.action_delay.is_zero() {
            info!(delay_ms = cfg.action_delay.as_millis() as u64, "delaying security actions");
        }
        if !request.abort.sleep(cfg.action_delay).await {
            info!(request_id = %request.request_id, "security actions aborted before start");
            return SecurityActionExecutionResult {
                request,
                results: Vec::new(),
                started_at,
                completed_at: Utc::now(),
                aborted: true,
            };
        }

        let actions = cfg.ordered_actions();
        let strategy: &dyn ExecutionStrategy = if cfg.execute_in_parallel {
            &self.parallel
        } else {
            &self.sequential
        };
        info!(
            request_id = %request.request_id,
            strategy = strategy.name(),
            actions = ?actions,
            "executing security actions"
        );

        let results = strategy
            .run(&actions, &self.executor, cfg, &request.abort)
            .await;

        let aborted = results.len() < actions.len();
        let out = SecurityActionExecutionResult {
            request,
            results,
            started_at,
            completed_at: Utc::now(),
            aborted,
        };
        info!(
            request_id = %out.request.request_id,
            succeeded = out.succeeded(),
            failed = out.failed(),
            aborted = out.aborted,
            "security actions finished"
        );
        out
    }

    /// Halt repeating effects (the alarm) without aborting the run.
    pub async fn stop_ongoing_actions(&self) {
        if let Err(e) = self.executor.stop_alarm().await {
            warn!(error = %e, "failed to stop alarm");
        } else {
            info!("ongoing actions stopped");
        }
    }
}
