//! Scenario: Resource protection gates repository calls made by the engine.
//!
//! # Invariants under test
//!
//! 1. After `failure_threshold` failed runs the circuit opens and the next
//!    run is refused before it reaches the repository.
//! 2. After the open timeout the circuit half-opens, and
//!    `success_threshold` successes close it again.
//! 3. The rate limiter refuses an action once its bucket is empty and the
//!    refusal is reported as a protection rejection.
//! 4. Disabled protection fails closed.
//!
//! GREEN when: repository call counts match exactly what was admitted.

use std::sync::Arc;
use std::time::Duration;

use mg_execution::{
    ActionExecutionError, ExecutionError, ExecutionRequest, SecurityActionExecutionEngine,
};
use mg_protection::{CircuitState, ProtectionError, ResourceProtector};
use mg_schemas::SecurityActionType::{ForceLogout, LockScreen};
use mg_schemas::SecurityActionType;
use mg_testkit::{actions, RecordingActionRepository};

struct Rig {
    engine: SecurityActionExecutionEngine,
    protector: Arc<ResourceProtector>,
    repo: Arc<RecordingActionRepository>,
}

fn rig(repo: RecordingActionRepository) -> Rig {
    let repo = Arc::new(repo);
    let protector = Arc::new(ResourceProtector::default());
    Rig {
        engine: SecurityActionExecutionEngine::new(repo.clone(), protector.clone()),
        protector,
        repo,
    }
}

async fn run_once(rig: &Rig, action: SecurityActionType) -> Result<(), ExecutionError> {
    let result = rig
        .engine
        .execute_actions(ExecutionRequest::new(actions(&[action])))
        .await;
    match &result.results[0].error {
        None => Ok(()),
        Some(e) => Err(e.clone()),
    }
}

// ---------------------------------------------------------------------------
// 1 + 2. Circuit breaker lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn circuit_opens_after_failures_and_recovers() {
    let rig = rig(RecordingActionRepository::new().failing(
        LockScreen,
        ActionExecutionError::Platform("screen saver unavailable".into()),
    ));

    // LockScreen defaults: 3 failures open, 2 successes close, 30 s timeout.
    for _ in 0..3 {
        let err = run_once(&rig, LockScreen).await.unwrap_err();
        assert!(matches!(err, ExecutionError::ActionFailed(_)));
    }
    assert_eq!(rig.protector.circuit_state(LockScreen).await, CircuitState::Open);

    let err = run_once(&rig, LockScreen).await.unwrap_err();
    assert!(err.is_protection_rejection());
    assert!(matches!(
        err,
        ExecutionError::Protection(ProtectionError::CircuitOpen { .. })
    ));
    assert_eq!(rig.repo.count("lock_screen").await, 3);

    let metrics = rig.protector.metrics(LockScreen).await;
    assert_eq!(metrics.failed_executions, 3);
    assert_eq!(metrics.circuit_rejections, 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(rig.protector.circuit_state(LockScreen).await, CircuitState::HalfOpen);

    rig.repo.clear_failure(LockScreen).await;
    run_once(&rig, LockScreen).await.unwrap();
    assert_eq!(rig.protector.circuit_state(LockScreen).await, CircuitState::HalfOpen);
    run_once(&rig, LockScreen).await.unwrap();
    assert_eq!(rig.protector.circuit_state(LockScreen).await, CircuitState::Closed);
    assert_eq!(rig.repo.count("lock_screen").await, 5);
}

#[tokio::test(start_paused = true)]
async fn half_open_failure_reopens() {
    let rig = rig(RecordingActionRepository::new().failing(
        LockScreen,
        ActionExecutionError::Platform("no display".into()),
    ));
    for _ in 0..3 {
        let _ = run_once(&rig, LockScreen).await;
    }
    tokio::time::sleep(Duration::from_secs(30)).await;

    let err = run_once(&rig, LockScreen).await.unwrap_err();
    assert!(matches!(err, ExecutionError::ActionFailed(_)));
    assert_eq!(rig.protector.circuit_state(LockScreen).await, CircuitState::Open);
}

// ---------------------------------------------------------------------------
// 3. Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn rate_limiter_refuses_when_bucket_empty() {
    let rig = rig(RecordingActionRepository::new());

    // ForceLogout defaults: capacity 2, one token per minute.
    run_once(&rig, ForceLogout).await.unwrap();
    run_once(&rig, ForceLogout).await.unwrap();
    let err = run_once(&rig, ForceLogout).await.unwrap_err();
    match err {
        ExecutionError::Protection(ProtectionError::RateLimited {
            action,
            retry_after,
        }) => {
            assert_eq!(action, ForceLogout);
            assert!(retry_after > Duration::ZERO);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(rig.repo.count("force_logout").await, 2);
    assert_eq!(rig.protector.metrics(ForceLogout).await.rate_limited_attempts, 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    run_once(&rig, ForceLogout).await.unwrap();
    assert_eq!(rig.repo.count("force_logout").await, 3);
}

// ---------------------------------------------------------------------------
// 4. Disabled protection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disabled_protection_fails_closed() {
    let rig = rig(RecordingActionRepository::new());
    rig.protector.set_enabled(false);

    let err = run_once(&rig, LockScreen).await.unwrap_err();
    assert_eq!(
        err,
        ExecutionError::Protection(ProtectionError::ProtectionDisabled)
    );
    assert!(rig.repo.calls().await.is_empty());
}
