use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::{ActionExecutionError, SecurityActionRepository};

/// Calls remembered by [`DryRunActionRepository::new`].
const DEFAULT_DRY_RUN_HISTORY: usize = 256;

/// Repository that performs no effect: every call is logged, remembered and
/// reported as successful.
///
/// Only the most recent `history_limit` calls are kept. Used by the daemon
/// when no platform backend is wired and by the CLI `simulate` command.
pub struct DryRunActionRepository {
    calls: Mutex<VecDeque<(DateTime<Utc>, String)>>,
    history_limit: usize,
}

impl Default for DryRunActionRepository {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_DRY_RUN_HISTORY)
    }
}

impl DryRunActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            calls: Mutex::new(VecDeque::new()),
            history_limit,
        }
    }

    /// Remembered calls, oldest first, as `(when, description)`.
    pub async fn calls(&self) -> Vec<(DateTime<Utc>, String)> {
        self.calls.lock().await.iter().cloned().collect()
    }

    async fn record(&self, what: String) -> Result<(), ActionExecutionError> {
        info!(effect = %what, "dry-run security action");
        let mut calls = self.calls.lock().await;
        if self.history_limit == 0 {
            return Ok(());
        }
        while calls.len() >= self.history_limit {
            calls.pop_front();
        }
        calls.push_back((Utc::now(), what));
        Ok(())
    }
}

#[async_trait]
impl SecurityActionRepository for DryRunActionRepository {
    async fn lock_screen(&self) -> Result<(), ActionExecutionError> {
        self.record("lock_screen".to_string()).await
    }

    async fn play_alarm(&self, volume: f32) -> Result<(), ActionExecutionError> {
        self.record(format!("play_alarm volume={volume:.2}")).await
    }

    async fn stop_alarm(&self) -> Result<(), ActionExecutionError> {
        self.record("stop_alarm".to_string()).await
    }

    async fn force_logout(&self) -> Result<(), ActionExecutionError> {
        self.record("force_logout".to_string()).await
    }

    async fn schedule_shutdown(&self, after_seconds: u64) -> Result<(), ActionExecutionError> {
        self.record(format!("schedule_shutdown after={after_seconds}s"))
            .await
    }

    async fn execute_script(&self, path: &Path) -> Result<(), ActionExecutionError> {
        self.record(format!("execute_script path={}", path.display()))
            .await
    }
}
