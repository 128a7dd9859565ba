//! Scenario: Auto-arm decisions against a live arm controller.
//!
//! # Invariants under test
//!
//! 1. Two triggers racing while Disarmed produce exactly one Arm and one
//!    Skip, and the controller arms once.
//! 2. After a manual disarm the cooldown still suppresses re-arming until it
//!    elapses.
//! 3. A deferred arm is voided by any transition during the notification
//!    delay.
//! 4. Temporarily disabling drops a pending arm.
//! 5. With notify-before-arming and a zero delay, the notice still precedes
//!    the arm.
//!
//! GREEN when: the number of automatic Armed notifications matches the
//! number of Arm decisions that reached the controller.

use std::time::Duration;

use mg_autoarm::{AutoArmDecision, AutoArmManager, SkipReason};
use mg_schemas::{
    AppState, ArmingConfiguration, AuthOutcome, AutoArmConfiguration, AutoArmTrigger,
    Notification, SecurityActionType::LockScreen,
};
use mg_testkit::{actions, GuardHarness, RecordingActionRepository};

fn setup(notify_before_arming: bool) -> (GuardHarness, AutoArmManager) {
    let h = GuardHarness::new(
        ArmingConfiguration::default(),
        actions(&[LockScreen]),
        RecordingActionRepository::new(),
    )
    .unwrap();
    let cfg = AutoArmConfiguration {
        is_enabled: true,
        notify_before_arming,
        cooldown_period: Duration::from_secs(60),
        notification_delay: Duration::from_secs(5),
        ..Default::default()
    };
    let manager = AutoArmManager::new(h.controller.clone(), cfg, h.notifier.clone());
    (h, manager)
}

fn automatic_arms(h: &GuardHarness) -> usize {
    h.notifier
        .count(|n| matches!(n, Notification::Armed { automatic: true }))
}

fn untrusted(ssid: &str) -> AutoArmTrigger {
    AutoArmTrigger::UntrustedNetwork(ssid.to_string())
}

// ---------------------------------------------------------------------------
// 1. Racing triggers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn racing_triggers_arm_exactly_once() {
    let (h, manager) = setup(false);

    let a = {
        let m = manager.clone();
        tokio::spawn(async move { m.handle_trigger(untrusted("cafe")).await })
    };
    let b = {
        let m = manager.clone();
        tokio::spawn(async move { m.handle_trigger(AutoArmTrigger::EnteredUntrustedLocation).await })
    };
    let decisions = [a.await.unwrap(), b.await.unwrap()];

    let arms = decisions.iter().filter(|d| d.is_arm()).count();
    assert_eq!(arms, 1, "decisions: {decisions:?}");
    assert!(decisions.iter().any(|d| matches!(
        d,
        AutoArmDecision::Skip(SkipReason::CooldownPeriod { .. } | SkipReason::AlreadyArmed)
    )));
    assert_eq!(h.controller.state(), AppState::Armed);
    assert_eq!(automatic_arms(&h), 1);
}

// ---------------------------------------------------------------------------
// 2. Cooldown survives a manual disarm
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cooldown_blocks_rearm_after_disarm_until_elapsed() {
    let (h, manager) = setup(false);

    assert!(manager.handle_trigger(untrusted("cafe")).await.is_arm());
    h.controller.disarm(AuthOutcome::Authenticated).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let d = manager.handle_trigger(untrusted("cafe")).await;
    assert!(matches!(d, AutoArmDecision::Skip(SkipReason::CooldownPeriod { .. })));
    assert_eq!(h.controller.state(), AppState::Disarmed);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(manager.handle_trigger(untrusted("cafe")).await.is_arm());
    assert_eq!(h.controller.state(), AppState::Armed);
    assert_eq!(automatic_arms(&h), 2);
}

// ---------------------------------------------------------------------------
// 3. Deferred arm voided by an intervening transition
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn deferred_arm_is_voided_by_intervening_transition() {
    let (h, manager) = setup(true);

    assert!(manager.handle_trigger(untrusted("airport")).await.is_arm());
    assert!(manager.has_pending_arm().await);
    assert_eq!(
        h.notifier
            .count(|n| matches!(n, Notification::AutoArmPending { delay_secs: 5, .. })),
        1
    );

    // The user arms and disarms by hand inside the delay.
    h.controller.arm(AuthOutcome::Authenticated).await.unwrap();
    h.controller.disarm(AuthOutcome::Authenticated).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.controller.state(), AppState::Disarmed);
    assert_eq!(automatic_arms(&h), 0);
}

#[tokio::test(start_paused = true)]
async fn deferred_arm_fires_after_delay() {
    let (h, manager) = setup(true);

    assert!(manager.handle_trigger(untrusted("airport")).await.is_arm());
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.controller.state(), AppState::Disarmed);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.controller.state(), AppState::Armed);
    assert_eq!(automatic_arms(&h), 1);
    assert!(!manager.has_pending_arm().await);
}

// ---------------------------------------------------------------------------
// 4. Temporary disable
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn temporary_disable_drops_pending_arm() {
    let (h, manager) = setup(true);

    assert!(manager.handle_trigger(untrusted("airport")).await.is_arm());
    manager.temporarily_disable(Duration::from_secs(600)).await;
    assert!(!manager.has_pending_arm().await);
    assert_eq!(h.notifier.count(|n| *n == Notification::AutoArmCancelled), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    let d = manager.handle_trigger(untrusted("airport")).await;
    assert!(matches!(
        d,
        AutoArmDecision::Skip(SkipReason::TemporarilyDisabled { .. })
    ));
    assert_eq!(h.controller.state(), AppState::Disarmed);
}

// ---------------------------------------------------------------------------
// 5. Notify before arming with no delay
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn zero_notification_delay_still_notifies_first() {
    let h = GuardHarness::new(
        ArmingConfiguration::default(),
        actions(&[LockScreen]),
        RecordingActionRepository::new(),
    )
    .unwrap();
    let cfg = AutoArmConfiguration {
        is_enabled: true,
        notify_before_arming: true,
        notification_delay: Duration::ZERO,
        ..Default::default()
    };
    let manager = AutoArmManager::new(h.controller.clone(), cfg, h.notifier.clone());

    assert!(manager.handle_trigger(untrusted("cafe")).await.is_arm());
    assert_eq!(h.controller.state(), AppState::Armed);
    assert!(!manager.has_pending_arm().await);
    assert_eq!(
        h.notifier.notifications(),
        vec![
            Notification::AutoArmPending {
                reason: untrusted("cafe").to_string(),
                delay_secs: 0,
            },
            Notification::Armed { automatic: true },
        ]
    );
}
