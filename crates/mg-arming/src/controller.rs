//! Arm controller: the single owner of [`AppState`].
//!
//! # State diagram
//!
//! ```text
//!              arm(auth ok)                 power disconnect
//!   Disarmed ───────────────────► Armed ─────────────────────► GracePeriod
//!      ▲                            │  ▲                           │   │
//!      │        disarm(auth)        │  │ cancel_grace_period(auth) │   │ countdown
//!      ├────────────────────────────┘  └───────────────────────────┘   │ expiry
//!      │        disarm(auth)                                           ▼
//!      ├───────────────────────────────────────────────────────── (GracePeriod)
//!      │        disarm(auth)                                           │
//!      └─────────────────────────────────────────────────────────  Triggered
//! ```
//!
//! With a zero grace period, a disconnect moves Armed → Triggered directly;
//! GracePeriod is never published.
//!
//! # Invariants
//!
//! - All transitions run under one async mutex; no two interleave.
//! - Authentication failures leave the state untouched and are returned to
//!   the caller. Nothing is retried here.
//! - Expiry and cancellation of the grace countdown race on a single-fire
//!   guard: exactly one of {Triggered, Armed} is observed.
//! - Triggered is left only by an authenticated disarm, which also aborts
//!   the response: no action starts after the disarm returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use mg_execution::{
    AbortSignal, ExecutionRequest, SecurityActionExecutionEngine, SecurityActionExecutionResult,
};
use mg_schemas::{
    AppState, ArmingConfiguration, AuthOutcome, Notification, Notifier,
    SecurityActionConfiguration,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{ArmError, Countdown, PowerSnapshot, PowerTracker, PowerTransition};

struct Core {
    state: AppState,
    arming: ArmingConfiguration,
    actions: Arc<SecurityActionConfiguration>,
    power: PowerTracker,
    grace: Option<Countdown>,
    /// Identifies the current grace countdown; a stale expiry is ignored.
    grace_id: u64,
    /// Abort handle of the response started by the last trigger.
    response: Option<AbortSignal>,
}

struct Shared {
    core: Mutex<Core>,
    state_tx: watch::Sender<AppState>,
    epoch: AtomicU64,
    engine: Arc<SecurityActionExecutionEngine>,
    notifier: Arc<dyn Notifier>,
    last_execution: Mutex<Option<SecurityActionExecutionResult>>,
}

/// Cloneable handle to the arm state machine.
#[derive(Clone)]
pub struct ArmController {
    shared: Arc<Shared>,
}

impl ArmController {
    /// Validates `actions`; boots `Disarmed`.
    pub fn new(
        arming: ArmingConfiguration,
        actions: SecurityActionConfiguration,
        engine: Arc<SecurityActionExecutionEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ArmError> {
        actions.validate()?;
        let (state_tx, _rx) = watch::channel(AppState::Disarmed);
        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: AppState::Disarmed,
                    arming,
                    actions: Arc::new(actions),
                    power: PowerTracker::new(),
                    grace: None,
                    grace_id: 0,
                    response: None,
                }),
                state_tx,
                epoch: AtomicU64::new(0),
                engine,
                notifier,
                last_execution: Mutex::new(None),
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Latest published state.
    pub fn state(&self) -> AppState {
        *self.shared.state_tx.borrow()
    }

    /// Receives every published state.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.shared.state_tx.subscribe()
    }

    /// Incremented on every transition. Lets deferred callers detect that
    /// something happened since they looked.
    pub fn transition_epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    pub async fn grace_period_remaining(&self) -> Option<Duration> {
        let core = self.shared.core.lock().await;
        match core.state {
            AppState::GracePeriod => core.grace.as_ref().map(Countdown::remaining),
            _ => None,
        }
    }

    pub async fn arming_configuration(&self) -> ArmingConfiguration {
        self.shared.core.lock().await.arming.clone()
    }

    pub async fn action_configuration(&self) -> Arc<SecurityActionConfiguration> {
        Arc::clone(&self.shared.core.lock().await.actions)
    }

    pub async fn last_execution_result(&self) -> Option<SecurityActionExecutionResult> {
        self.shared.last_execution.lock().await.clone()
    }

    pub fn engine(&self) -> &Arc<SecurityActionExecutionEngine> {
        &self.shared.engine
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Swap the action configuration. Applies to the next trigger; a run in
    /// progress keeps the configuration it started with.
    pub async fn update_action_configuration(
        &self,
        actions: SecurityActionConfiguration,
    ) -> Result<(), ArmError> {
        actions.validate()?;
        self.shared.core.lock().await.actions = Arc::new(actions);
        info!("security action configuration updated");
        Ok(())
    }

    /// Swap the arming policy. A running grace countdown keeps its deadline.
    pub async fn update_arming_configuration(&self, arming: ArmingConfiguration) {
        self.shared.core.lock().await.arming = arming;
        info!("arming configuration updated");
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Disarmed → Armed.
    pub async fn arm(&self, auth: AuthOutcome) -> Result<(), ArmError> {
        let mut core = self.shared.core.lock().await;
        if core.state != AppState::Disarmed {
            return Err(ArmError::InvalidTransition {
                from: core.state,
                operation: "arm",
            });
        }
        if let Err(e) = auth.into_result() {
            warn!(error = %e, "arm refused: authentication failed");
            return Err(e.into());
        }
        self.shared.set_state(&mut core, AppState::Armed);
        drop(core);

        info!("armed");
        self.shared.notifier.notify(Notification::Armed { automatic: false });
        Ok(())
    }

    /// Disarmed → Armed without an interactive prompt, for environmental
    /// triggers.
    ///
    /// Only proceeds if no transition happened since `expected_epoch`.
    /// Returns `Ok(false)` when skipped for that reason or because the
    /// system is no longer disarmed.
    pub async fn auto_arm(&self, reason: &str, expected_epoch: u64) -> Result<bool, ArmError> {
        let mut core = self.shared.core.lock().await;
        if self.transition_epoch() != expected_epoch || core.state != AppState::Disarmed {
            debug!(
                reason,
                expected_epoch,
                epoch = self.transition_epoch(),
                state = %core.state,
                "auto-arm skipped: state moved on"
            );
            return Ok(false);
        }
        self.shared.set_state(&mut core, AppState::Armed);
        drop(core);

        info!(reason, "armed automatically");
        self.shared.notifier.notify(Notification::Armed { automatic: true });
        Ok(true)
    }

    /// Armed | GracePeriod | Triggered → Disarmed.
    ///
    /// Cancels a pending grace countdown. Leaving Triggered aborts the
    /// running response (its delay and any action not yet started) and stops
    /// repeating effects (the alarm).
    pub async fn disarm(&self, auth: AuthOutcome) -> Result<(), ArmError> {
        let mut core = self.shared.core.lock().await;
        let from = core.state;
        if from == AppState::Disarmed {
            return Err(ArmError::InvalidTransition {
                from,
                operation: "disarm",
            });
        }
        if core.arming.require_auth_to_disarm {
            if let Err(e) = auth.into_result() {
                warn!(error = %e, from = %from, "disarm refused: authentication failed");
                return Err(e.into());
            }
        }

        if let Some(grace) = core.grace.take() {
            // If expiry already claimed the guard, its handler will find the
            // state Disarmed and do nothing.
            grace.cancel();
        }
        if let Some(response) = core.response.take() {
            if response.abort() {
                debug!("security response abort signalled");
            }
        }
        self.shared.set_state(&mut core, AppState::Disarmed);
        drop(core);

        if from == AppState::Triggered {
            self.shared.engine.stop_ongoing_actions().await;
        }
        info!(from = %from, "disarmed");
        self.shared.notifier.notify(Notification::Disarmed);
        Ok(())
    }

    /// GracePeriod → Armed.
    pub async fn cancel_grace_period(&self, auth: AuthOutcome) -> Result<(), ArmError> {
        let mut core = self.shared.core.lock().await;
        if core.state != AppState::GracePeriod {
            return Err(ArmError::InvalidTransition {
                from: core.state,
                operation: "cancel grace period",
            });
        }
        if !core.arming.allow_grace_period_cancellation {
            return Err(ArmError::CancellationNotAllowed);
        }
        if let Err(e) = auth.into_result() {
            warn!(error = %e, "grace period cancellation refused: authentication failed");
            return Err(e.into());
        }

        let cancelled = core.grace.as_ref().map(Countdown::cancel).unwrap_or(false);
        if !cancelled {
            // Expiry won the race and is waiting for this lock to trigger.
            warn!("grace period cancellation lost race with expiry");
            return Err(ArmError::GracePeriodElapsed);
        }
        core.grace = None;
        self.shared.set_state(&mut core, AppState::Armed);
        drop(core);

        info!("grace period cancelled; re-armed");
        self.shared.notifier.notify(Notification::GracePeriodCancelled);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Power
    // -----------------------------------------------------------------------

    /// Feed one power snapshot. Returns the edge it produced, if any.
    pub async fn handle_power_snapshot(&self, snapshot: &PowerSnapshot) -> Option<PowerTransition> {
        let mut core = self.shared.core.lock().await;
        let edge = core.power.observe(snapshot)?;
        match edge {
            PowerTransition::Disconnected => self.shared.on_disconnect(&mut core),
            PowerTransition::Connected => {
                debug!(state = %core.state, "power adapter connected");
            }
        }
        Some(edge)
    }

    /// Consume a power snapshot stream until it ends.
    pub fn watch_power<S>(&self, snapshots: S) -> JoinHandle<()>
    where
        S: Stream<Item = PowerSnapshot> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut snapshots = std::pin::pin!(snapshots);
            while let Some(snapshot) = snapshots.next().await {
                this.handle_power_snapshot(&snapshot).await;
            }
            warn!("power snapshot stream ended");
        })
    }
}

impl Shared {
    /// Caller holds the core lock.
    fn set_state(&self, core: &mut Core, next: AppState) {
        let prev = core.state;
        core.state = next;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state_tx.send_replace(next);
        debug!(from = %prev, to = %next, "state transition");
    }

    fn on_disconnect(self: &Arc<Self>, core: &mut Core) {
        if core.state != AppState::Armed {
            debug!(state = %core.state, "power disconnected; not armed, ignoring");
            return;
        }

        if !core.arming.has_grace_period() {
            info!("power disconnected; no grace period, triggering");
            self.trigger(core);
            return;
        }

        let delay = core.arming.grace_period;
        core.grace_id += 1;
        let grace_id = core.grace_id;
        let weak: Weak<Shared> = Arc::downgrade(self);
        core.grace = Some(Countdown::start(delay, move || async move {
            if let Some(shared) = weak.upgrade() {
                shared.grace_expired(grace_id).await;
            }
        }));
        self.set_state(core, AppState::GracePeriod);

        info!(grace_secs = delay.as_secs_f64(), "power disconnected; grace period started");
        self.notifier.notify(Notification::from_grace_period(delay));
    }

    async fn grace_expired(self: &Arc<Self>, grace_id: u64) {
        let mut core = self.core.lock().await;
        if core.state != AppState::GracePeriod || core.grace_id != grace_id {
            debug!(grace_id, state = %core.state, "stale grace expiry ignored");
            return;
        }
        core.grace = None;
        info!("grace period expired; triggering");
        self.trigger(&mut core);
    }

    /// Enter Triggered and hand the current configuration to the engine.
    fn trigger(self: &Arc<Self>, core: &mut Core) {
        self.set_state(core, AppState::Triggered);
        self.notifier.notify(Notification::Triggered);

        let request = ExecutionRequest::new((*core.actions).clone());
        core.response = Some(request.abort.clone());
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.engine.execute_actions(request).await;
            if result.was_rejected_as_duplicate() {
                error!("trigger ignored: a security response is already running");
                return;
            }
            if result.aborted {
                info!(ran = result.results.len(), "security response aborted by disarm");
            } else {
                shared.notifier.notify(Notification::ActionsCompleted {
                    succeeded: result.succeeded(),
                    failed: result.failed(),
                });
            }
            *shared.last_execution.lock().await = Some(result);
        });
    }
}
