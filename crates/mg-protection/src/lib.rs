//! mg-protection
//!
//! Admission control for destructive security actions.
//!
//! - [`RateLimiter`]: per-key token bucket. Stops runaway repeated triggering.
//! - [`CircuitBreaker`]: per-key Closed/Open/HalfOpen gate. Stops hammering an
//!   action that keeps failing.
//! - [`ResourceProtector`]: both of the above behind one admission + metrics
//!   API keyed by [`mg_schemas::SecurityActionType`].
//!
//! The bucket and breaker arithmetic lives in plain structs that take `now`
//! as an argument; the async wrappers own the per-key maps behind a mutex
//! that never leaves the component. All time is `tokio::time::Instant`
//! (monotonic).

mod circuit_breaker;
mod protector;
mod rate_limiter;
mod types;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use protector::ResourceProtector;
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use types::*;
