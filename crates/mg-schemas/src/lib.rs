//! mg-schemas
//!
//! Shared data model for the guard core: arm state, security action
//! identifiers and configuration, auto-arm configuration, authentication
//! outcomes and the notification sink contract.
//!
//! Plain data plus validation. No IO, no clock, no async.

mod action;
mod auth;
mod autoarm;
mod error;
mod notify;
mod state;

pub use action::*;
pub use auth::*;
pub use autoarm::*;
pub use error::ConfigurationError;
pub use notify::*;
pub use state::*;
