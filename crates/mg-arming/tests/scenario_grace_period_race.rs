//! Scenario: grace period expiry vs. cancellation.
//!
//! GREEN when:
//! - Armed + disconnect with a 5s grace period publishes GracePeriod, then
//!   Triggered once 5s have elapsed, and the configured actions run.
//! - An authenticated cancellation 1s before expiry re-arms; nothing runs,
//!   ever.
//! - A zero grace period goes straight from Armed to Triggered; GracePeriod
//!   is never published.
//! - Disarm from Triggered stops the alarm.

use std::sync::Arc;
use std::time::Duration;

use mg_arming::{ArmController, PowerSnapshot};
use mg_execution::{DryRunActionRepository, SecurityActionExecutionEngine};
use mg_protection::ResourceProtector;
use mg_schemas::{
    AppState, ArmingConfiguration, AuthOutcome, NullNotifier, SecurityActionConfiguration,
    SecurityActionType,
};

fn setup(grace: Duration) -> (ArmController, Arc<DryRunActionRepository>) {
    let repo = Arc::new(DryRunActionRepository::new());
    let engine = Arc::new(SecurityActionExecutionEngine::new(
        repo.clone(),
        Arc::new(ResourceProtector::default()),
    ));
    let controller = ArmController::new(
        ArmingConfiguration {
            grace_period: grace,
            allow_grace_period_cancellation: true,
            require_auth_to_disarm: true,
        },
        SecurityActionConfiguration {
            enabled_actions: vec![SecurityActionType::SoundAlarm, SecurityActionType::LockScreen],
            alarm_volume: 0.5,
            ..Default::default()
        },
        engine,
        Arc::new(NullNotifier),
    )
    .unwrap();
    (controller, repo)
}

async fn unplug(c: &ArmController) {
    c.handle_power_snapshot(&PowerSnapshot::now(true)).await;
    c.handle_power_snapshot(&PowerSnapshot::now(false)).await;
}

async fn call_names(repo: &DryRunActionRepository) -> Vec<String> {
    repo.calls().await.into_iter().map(|(_, c)| c).collect()
}

#[tokio::test(start_paused = true)]
async fn expiry_triggers_configured_actions() {
    let (c, repo) = setup(Duration::from_secs(5));
    c.arm(AuthOutcome::Authenticated).await.unwrap();
    unplug(&c).await;
    assert_eq!(c.state(), AppState::GracePeriod);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(c.state(), AppState::GracePeriod);
    assert!(call_names(&repo).await.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(c.state(), AppState::Triggered);
    assert_eq!(call_names(&repo).await, vec!["lock_screen", "play_alarm volume=0.50"]);

    let last = c.last_execution_result().await.unwrap();
    assert_eq!(last.results.len(), 2);
    assert!(last.all_succeeded());
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_expiry_rearms() {
    let (c, repo) = setup(Duration::from_secs(5));
    c.arm(AuthOutcome::Authenticated).await.unwrap();
    unplug(&c).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    c.cancel_grace_period(AuthOutcome::Authenticated).await.unwrap();
    assert_eq!(c.state(), AppState::Armed);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(c.state(), AppState::Armed);
    assert!(call_names(&repo).await.is_empty());
    assert!(c.last_execution_result().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn zero_grace_period_triggers_immediately() {
    let (c, repo) = setup(Duration::ZERO);
    let mut rx = c.subscribe();
    c.arm(AuthOutcome::Authenticated).await.unwrap();
    assert_eq!(*rx.borrow_and_update(), AppState::Armed);

    unplug(&c).await;
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), AppState::Triggered);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(call_names(&repo).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn disarm_from_triggered_stops_alarm() {
    let (c, repo) = setup(Duration::ZERO);
    c.arm(AuthOutcome::Authenticated).await.unwrap();
    unplug(&c).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    c.disarm(AuthOutcome::Authenticated).await.unwrap();
    assert_eq!(c.state(), AppState::Disarmed);
    assert_eq!(call_names(&repo).await.last().map(String::as_str), Some("stop_alarm"));
}

#[tokio::test(start_paused = true)]
async fn reconnect_during_grace_period_does_not_cancel() {
    let (c, _repo) = setup(Duration::from_secs(5));
    c.arm(AuthOutcome::Authenticated).await.unwrap();
    unplug(&c).await;
    c.handle_power_snapshot(&PowerSnapshot::now(true)).await;
    assert_eq!(c.state(), AppState::GracePeriod);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(c.state(), AppState::Triggered);
}
