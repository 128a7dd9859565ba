//! mg-arming
//!
//! The arm/disarm state machine and its timers.
//!
//! - [`ArmController`]: owns the single [`mg_schemas::AppState`]; every
//!   transition is serialized through it. On grace-period expiry it hands
//!   the current action configuration to the execution engine.
//! - [`Countdown`]: cancellable delayed action with a single-fire guard.
//!   Used for the grace period here and for deferred auto-arm downstream.
//! - [`PowerTracker`]: derives connect/disconnect edges from a stream of
//!   power snapshots.

mod controller;
mod countdown;
mod error;
mod power;

pub use controller::ArmController;
pub use countdown::{saturating_deadline, Countdown, CountdownGuard, CountdownOutcome, MAX_DELAY};
pub use error::ArmError;
pub use power::{PowerSnapshot, PowerTracker, PowerTransition};
