//! Recording doubles for the action repository and the notifier.
//!
//! Deterministic: no OS effects, no randomness. Latency uses
//! `tokio::time::sleep` so paused-clock tests control it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use mg_execution::{ActionExecutionError, SecurityActionRepository};
use mg_schemas::{Notification, Notifier, SecurityActionType};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

// ---------------------------------------------------------------------------
// RecordingActionRepository
// ---------------------------------------------------------------------------

/// One repository call as observed by the double.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Call label, e.g. `lock_screen`, `play_alarm volume=0.50`.
    pub call: String,
    pub started_at: Instant,
    /// `None` while the call is still running.
    pub finished_at: Option<Instant>,
}

/// Repository double that logs every call and can fail or stall per action.
///
/// `stop_alarm` is always recorded and never fails.
#[derive(Default)]
pub struct RecordingActionRepository {
    failures: Mutex<HashMap<SecurityActionType, ActionExecutionError>>,
    latency: HashMap<SecurityActionType, Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call for `action` fails with `error` until [`Self::clear_failure`].
    pub fn failing(mut self, action: SecurityActionType, error: ActionExecutionError) -> Self {
        self.failures.get_mut().insert(action, error);
        self
    }

    /// Every call for `action` takes `latency` before completing.
    pub fn with_latency(mut self, action: SecurityActionType, latency: Duration) -> Self {
        self.latency.insert(action, latency);
        self
    }

    pub async fn set_failure(&self, action: SecurityActionType, error: ActionExecutionError) {
        self.failures.lock().await.insert(action, error);
    }

    pub async fn clear_failure(&self, action: SecurityActionType) {
        self.failures.lock().await.remove(&action);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Call labels in the order the calls started.
    pub async fn call_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|c| c.call.clone())
            .collect()
    }

    pub async fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.call.starts_with(prefix))
            .count()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn perform(
        &self,
        action: Option<SecurityActionType>,
        call: String,
    ) -> Result<(), ActionExecutionError> {
        let slot = {
            let mut calls = self.calls.lock().await;
            calls.push(RecordedCall {
                call: call.clone(),
                started_at: Instant::now(),
                finished_at: None,
            });
            calls.len() - 1
        };
        let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_running, Ordering::SeqCst);

        if let Some(latency) = action.and_then(|a| self.latency.get(&a)).copied() {
            tokio::time::sleep(latency).await;
        }
        let outcome = match action {
            Some(a) => self.failures.lock().await.get(&a).cloned().map_or(Ok(()), Err),
            None => Ok(()),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug!(call = %call, ok = outcome.is_ok(), "recorded repository call");
        if let Some(entry) = self.calls.lock().await.get_mut(slot) {
            entry.finished_at = Some(Instant::now());
        }
        outcome
    }
}

#[async_trait]
impl SecurityActionRepository for RecordingActionRepository {
    async fn lock_screen(&self) -> Result<(), ActionExecutionError> {
        self.perform(Some(SecurityActionType::LockScreen), "lock_screen".into())
            .await
    }

    async fn play_alarm(&self, volume: f32) -> Result<(), ActionExecutionError> {
        self.perform(
            Some(SecurityActionType::SoundAlarm),
            format!("play_alarm volume={volume:.2}"),
        )
        .await
    }

    async fn stop_alarm(&self) -> Result<(), ActionExecutionError> {
        self.perform(None, "stop_alarm".into()).await
    }

    async fn force_logout(&self) -> Result<(), ActionExecutionError> {
        self.perform(Some(SecurityActionType::ForceLogout), "force_logout".into())
            .await
    }

    async fn schedule_shutdown(&self, after_seconds: u64) -> Result<(), ActionExecutionError> {
        self.perform(
            Some(SecurityActionType::Shutdown),
            format!("schedule_shutdown after={after_seconds}s"),
        )
        .await
    }

    async fn execute_script(&self, path: &Path) -> Result<(), ActionExecutionError> {
        self.perform(
            Some(SecurityActionType::CustomScript),
            format!("execute_script {}", path.display()),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Keeps every notification in delivery order.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: StdMutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.notifications().iter().filter(|n| pred(n)).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}
