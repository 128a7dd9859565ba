//! Boundary to the OS-level action implementations.
//!
//! This module defines only the trait and its error type. Concrete
//! implementations (screen lock, audio, session logout, shutdown scheduling,
//! script execution) live outside the core.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Typed failure of a single effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionExecutionError {
    /// The platform refused the operation (missing entitlement, no session, ...).
    PermissionDenied(String),
    /// The configured script does not exist or is not executable.
    ScriptNotFound(PathBuf),
    /// The script ran and exited unsuccessfully.
    ScriptFailed { exit_code: Option<i32> },
    /// Any other platform failure.
    Platform(String),
}

impl fmt::Display for ActionExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionExecutionError::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            ActionExecutionError::ScriptNotFound(p) => {
                write!(f, "script not found: {}", p.display())
            }
            ActionExecutionError::ScriptFailed { exit_code: Some(c) } => {
                write!(f, "script exited with status {c}")
            }
            ActionExecutionError::ScriptFailed { exit_code: None } => {
                write!(f, "script terminated by signal")
            }
            ActionExecutionError::Platform(msg) => write!(f, "platform error: {msg}"),
        }
    }
}

impl std::error::Error for ActionExecutionError {}

/// The effects a triggered response can perform.
///
/// Implementations must be object-safe and `Send + Sync` so the engine can
/// hold an `Arc<dyn SecurityActionRepository>` across tasks. No operation
/// returns anything beyond success or a typed failure.
#[async_trait]
pub trait SecurityActionRepository: Send + Sync {
    async fn lock_screen(&self) -> Result<(), ActionExecutionError>;

    /// `volume` is in [0, 1]. Keeps playing until [`Self::stop_alarm`].
    async fn play_alarm(&self, volume: f32) -> Result<(), ActionExecutionError>;

    async fn stop_alarm(&self) -> Result<(), ActionExecutionError>;

    async fn force_logout(&self) -> Result<(), ActionExecutionError>;

    async fn schedule_shutdown(&self, after_seconds: u64) -> Result<(), ActionExecutionError>;

    async fn execute_script(&self, path: &Path) -> Result<(), ActionExecutionError>;
}
