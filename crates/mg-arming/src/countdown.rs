//! Cancellable delayed action with a single-fire guard.
//!
//! # Invariant
//!
//! A countdown ends in exactly one of {fired, cancelled}. Expiry and
//! cancellation race on one compare-and-swap; the loser observes the
//! winner's outcome and does nothing. Never both, never neither (once the
//! delay has elapsed or `cancel` was called).

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Pending,
    Fired,
    Cancelled,
}

/// Single-assignment outcome cell.
#[derive(Debug, Default)]
pub struct CountdownGuard {
    state: AtomicU8,
}

impl CountdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the fire outcome. `true` exactly once, and only if not cancelled.
    pub fn try_fire(&self) -> bool {
        self.transition(FIRED)
    }

    /// Claim the cancel outcome. `true` exactly once, and only if not fired.
    pub fn try_cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    pub fn outcome(&self) -> CountdownOutcome {
        match self.state.load(Ordering::SeqCst) {
            FIRED => CountdownOutcome::Fired,
            CANCELLED => CountdownOutcome::Cancelled,
            _ => CountdownOutcome::Pending,
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Longest delay measured from an [`Instant`]. Longer requests saturate.
pub const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `from + delay`, saturating instead of overflowing the clock.
pub fn saturating_deadline(from: Instant, delay: Duration) -> Instant {
    let mut delay = delay.min(MAX_DELAY);
    loop {
        if let Some(deadline) = from.checked_add(delay) {
            return deadline;
        }
        delay /= 2;
    }
}

/// A running countdown. Dropping it cancels it if it has not fired.
pub struct Countdown {
    guard: Arc<CountdownGuard>,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a countdown that runs `on_fire` after `delay` unless cancelled
    /// first.
    pub fn start<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = Arc::new(CountdownGuard::new());
        let deadline = saturating_deadline(Instant::now(), delay);
        let task_guard = Arc::clone(&guard);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if task_guard.try_fire() {
                on_fire().await;
            }
        });
        Self {
            guard,
            deadline,
            task,
        }
    }

    /// `true` if this call cancelled the countdown; `false` if it had
    /// already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        if self.guard.try_cancel() {
            self.task.abort();
            true
        } else {
            false
        }
    }

    pub fn outcome(&self) -> CountdownOutcome {
        self.guard.outcome()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}
