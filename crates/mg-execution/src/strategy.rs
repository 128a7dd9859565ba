//! Sequential and parallel execution strategies.
//!
//! Both return one [`SecurityActionResult`] per action they ran, in input
//! order, and both continue past individual failures. Only an abort ends a
//! run early.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use mg_schemas::{SecurityActionConfiguration, SecurityActionType};
use tracing::debug;

use crate::{AbortSignal, ProtectedActionExecutor, SecurityActionResult};

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        actions: &[SecurityActionType],
        executor: &ProtectedActionExecutor,
        cfg: &SecurityActionConfiguration,
        abort: &AbortSignal,
    ) -> Vec<SecurityActionResult>;
}

/// One action at a time, spaced by `action_spacing`. The spacing wait is
/// abortable; no action starts after an abort.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn run(
        &self,
        actions: &[SecurityActionType],
        executor: &ProtectedActionExecutor,
        cfg: &SecurityActionConfiguration,
        abort: &AbortSignal,
    ) -> Vec<SecurityActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        for (i, action) in actions.iter().copied().enumerate() {
            let pause = if i == 0 { Duration::ZERO } else { cfg.action_spacing };
            if !abort.sleep(pause).await {
                debug!(remaining = actions.len() - i, "sequential run aborted");
                break;
            }
            debug!(action = %action, position = i, "sequential step");
            let outcome = executor.execute(action, cfg).await;
            results.push(SecurityActionResult::from_outcome(action, outcome));
        }
        results
    }
}

/// All actions concurrently. Completion order does not affect result order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn run(
        &self,
        actions: &[SecurityActionType],
        executor: &ProtectedActionExecutor,
        cfg: &SecurityActionConfiguration,
        _abort: &AbortSignal,
    ) -> Vec<SecurityActionResult> {
        // join_all yields outputs in the order of its input futures.
        join_all(actions.iter().copied().map(|action| async move {
            let outcome = executor.execute(action, cfg).await;
            SecurityActionResult::from_outcome(action, outcome)
        }))
        .await
    }
}
