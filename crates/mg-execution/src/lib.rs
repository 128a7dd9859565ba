//! mg-execution
//!
//! Runs the configured security response.
//!
//! ```text
//! SecurityActionExecutionEngine::execute_actions(request)
//!     │  single-flight guard, abortable action_delay, LockScreen-first ordering
//!     │
//!     ├── SequentialStrategy  (one at a time, abortable action_spacing)
//!     └── ParallelStrategy    (all at once, results in input order)
//!             │
//!             └── ProtectedActionExecutor::execute(action)
//!                     ├── ResourceProtector::check_action     (admission)
//!                     ├── SecurityActionRepository::*          (the effect)
//!                     └── record_success / record_failure       (outcome)
//! ```
//!
//! The OS-level effects live behind [`SecurityActionRepository`]; this crate
//! only ships a logging [`DryRunActionRepository`].

mod dry_run;
mod engine;
mod protected;
mod repository;
mod strategy;
mod types;

pub use dry_run::DryRunActionRepository;
pub use engine::SecurityActionExecutionEngine;
pub use protected::ProtectedActionExecutor;
pub use repository::{ActionExecutionError, SecurityActionRepository};
pub use strategy::{ExecutionStrategy, ParallelStrategy, SequentialStrategy};
pub use types::*;
