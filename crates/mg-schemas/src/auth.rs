use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an authentication attempt did not succeed.
///
/// Surfaced to the caller verbatim. The core never retries authentication on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationError {
    UserCancelled,
    LockedOut,
    Failed,
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationError::UserCancelled => write!(f, "AUTH_CANCELLED: user cancelled authentication"),
            AuthenticationError::LockedOut => write!(f, "AUTH_LOCKED_OUT: too many failed attempts"),
            AuthenticationError::Failed => write!(f, "AUTH_FAILED: authentication failed"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Result of asking the authentication service to confirm the user.
///
/// Transitions that require authentication take one of these; how it was
/// obtained (biometric prompt, passphrase, ...) is the caller's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    Authenticated,
    Rejected(AuthenticationError),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated)
    }

    pub fn into_result(self) -> Result<(), AuthenticationError> {
        match self {
            AuthOutcome::Authenticated => Ok(()),
            AuthOutcome::Rejected(e) => Err(e),
        }
    }
}

/// What the user is being asked to authenticate for. Passed to prompts so
/// they can show a specific message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPurpose {
    Arm,
    Disarm,
    CancelGracePeriod,
}

impl AuthPurpose {
    pub fn prompt(&self) -> &'static str {
        match self {
            AuthPurpose::Arm => "Authenticate to arm the power guard",
            AuthPurpose::Disarm => "Authenticate to disarm the power guard",
            AuthPurpose::CancelGracePeriod => "Authenticate to cancel the security response",
        }
    }
}
