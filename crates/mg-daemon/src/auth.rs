//! Passphrase authentication for the HTTP control surface.
//!
//! Produces the [`AuthOutcome`] that arm/disarm/cancel transitions consume.
//!
//! # Invariants
//!
//! - No passphrase configured → every attempt fails (fail-closed).
//! - `MAX_FAILED_ATTEMPTS` consecutive failures lock the authenticator for
//!   `LOCKOUT`; while locked, even the right passphrase is refused.
//! - A success resets the failure count.

use std::time::Duration;

use mg_schemas::{AuthOutcome, AuthPurpose, AuthenticationError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

pub const MAX_FAILED_ATTEMPTS: u32 = 5;
pub const LOCKOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Attempts {
    consecutive_failures: u32,
    locked_until: Option<Instant>,
}

pub struct PassphraseAuthenticator {
    passphrase: Option<String>,
    attempts: Mutex<Attempts>,
}

impl PassphraseAuthenticator {
    pub fn new(passphrase: Option<String>) -> Self {
        Self {
            passphrase: passphrase.filter(|p| !p.is_empty()),
            attempts: Mutex::new(Attempts::default()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.passphrase.is_some()
    }

    /// `presented == None` is treated as the user dismissing the prompt.
    pub async fn authenticate(&self, purpose: AuthPurpose, presented: Option<&str>) -> AuthOutcome {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();

        if let Some(until) = attempts.locked_until {
            if now < until {
                warn!(purpose = ?purpose, "authentication refused: locked out");
                return AuthOutcome::Rejected(AuthenticationError::LockedOut);
            }
            attempts.locked_until = None;
        }

        let Some(presented) = presented else {
            return AuthOutcome::Rejected(AuthenticationError::UserCancelled);
        };

        let ok = match &self.passphrase {
            Some(expected) => constant_time_eq(expected.as_bytes(), presented.as_bytes()),
            None => {
                warn!("authentication refused: no passphrase configured");
                false
            }
        };

        if ok {
            attempts.consecutive_failures = 0;
            return AuthOutcome::Authenticated;
        }

        attempts.consecutive_failures += 1;
        warn!(
            purpose = ?purpose,
            failures = attempts.consecutive_failures,
            "authentication failed"
        );
        if attempts.consecutive_failures >= MAX_FAILED_ATTEMPTS {
            attempts.consecutive_failures = 0;
            attempts.locked_until = Some(now + LOCKOUT);
            warn!(lockout_secs = LOCKOUT.as_secs(), "authentication locked out");
        }
        AuthOutcome::Rejected(AuthenticationError::Failed)
    }
}

/// Comparison time depends only on the lengths, never on where the first
/// mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = u8::from(a.len() != b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}
