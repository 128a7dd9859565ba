use std::fmt;

use mg_schemas::{AppState, AuthenticationError, ConfigurationError};

/// Why a requested transition did not happen. The state is unchanged in
/// every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmError {
    Authentication(AuthenticationError),
    /// The operation is not defined from the current state.
    InvalidTransition {
        from: AppState,
        operation: &'static str,
    },
    /// Grace-period cancellation is switched off in the arming configuration.
    CancellationNotAllowed,
    /// The grace period expired before the cancellation landed; the trigger
    /// wins.
    GracePeriodElapsed,
    Configuration(ConfigurationError),
}

impl ArmError {
    pub fn code(&self) -> &'static str {
        match self {
            ArmError::Authentication(AuthenticationError::LockedOut) => "auth_locked_out",
            ArmError::Authentication(AuthenticationError::UserCancelled) => "auth_cancelled",
            ArmError::Authentication(AuthenticationError::Failed) => "auth_failed",
            ArmError::InvalidTransition { .. } => "invalid_transition",
            ArmError::CancellationNotAllowed => "cancellation_not_allowed",
            ArmError::GracePeriodElapsed => "grace_period_elapsed",
            ArmError::Configuration(_) => "configuration_invalid",
        }
    }
}

impl fmt::Display for ArmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmError::Authentication(e) => write!(f, "{e}"),
            ArmError::InvalidTransition { from, operation } => {
                write!(f, "TRANSITION_REFUSED: cannot {operation} while {from}")
            }
            ArmError::CancellationNotAllowed => {
                write!(f, "TRANSITION_REFUSED: grace period cancellation is disabled")
            }
            ArmError::GracePeriodElapsed => {
                write!(f, "TRANSITION_REFUSED: grace period already elapsed")
            }
            ArmError::Configuration(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ArmError {}

impl From<AuthenticationError> for ArmError {
    fn from(e: AuthenticationError) -> Self {
        ArmError::Authentication(e)
    }
}

impl From<ConfigurationError> for ArmError {
    fn from(e: ConfigurationError) -> Self {
        ArmError::Configuration(e)
    }
}
