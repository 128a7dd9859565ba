//! mg-autoarm
//!
//! Arms the guard on environmental signals.
//!
//! ```text
//! LocationMonitor ──fix──► LocationTrustRegistry ─┐
//!                                                  ├─ AutoArmTrigger ─► AutoArmDecisionEngine
//! NetworkMonitor ──ssid──► NetworkTrustRegistry  ─┘                          │ Arm(reason)
//!                                                                             ▼
//!                                        (notify, Countdown) ─► ArmController::auto_arm
//! ```
//!
//! [`AutoArmManager`] wires the pieces together. The decision engine is pure
//! policy (enabled, already armed, temporary disable, cooldown) and never
//! touches the controller itself.

mod decision;
mod manager;
mod monitor;
mod trust;

pub use decision::{AutoArmDecision, AutoArmDecisionEngine, AutoArmEvent, SkipReason};
pub use manager::AutoArmManager;
pub use monitor::{
    ChannelLocationMonitor, ChannelMonitor, ChannelNetworkMonitor, LocationMonitor, MonitorError,
    NetworkMonitor,
};
pub use trust::{
    LocationFix, LocationTrustRegistry, NetworkObservation, NetworkTrustRegistry,
    TrustedLocation, TrustedNetwork,
};
