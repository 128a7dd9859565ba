//! Location and network observation sources.
//!
//! Platform backends implement [`LocationMonitor`] / [`NetworkMonitor`].
//! [`ChannelMonitor`] is the in-process implementation: observations are
//! pushed by the owner (the daemon's HTTP surface, tests) and fanned out to
//! every `events()` stream while monitoring is active.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::{LocationFix, NetworkObservation};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    PermissionDenied(String),
    Unavailable(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::PermissionDenied(what) => write!(f, "MONITOR_PERMISSION_DENIED: {what}"),
            MonitorError::Unavailable(what) => write!(f, "MONITOR_UNAVAILABLE: {what}"),
        }
    }
}

impl std::error::Error for MonitorError {}

#[async_trait]
pub trait LocationMonitor: Send + Sync {
    async fn start_monitoring(&self) -> Result<(), MonitorError>;
    async fn stop_monitoring(&self);
    /// Fixes observed after this call. Lazy; ends when the monitor is dropped.
    fn events(&self) -> BoxStream<'static, LocationFix>;
}

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn start_monitoring(&self) -> Result<(), MonitorError>;
    async fn stop_monitoring(&self);
    fn events(&self) -> BoxStream<'static, NetworkObservation>;
}

/// Push-driven monitor over a broadcast channel.
pub struct ChannelMonitor<T> {
    name: &'static str,
    tx: broadcast::Sender<T>,
    active: AtomicBool,
}

pub type ChannelLocationMonitor = ChannelMonitor<LocationFix>;
pub type ChannelNetworkMonitor = ChannelMonitor<NetworkObservation>;

impl<T: Clone + Send + 'static> ChannelMonitor<T> {
    pub fn new(name: &'static str) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            name,
            tx,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Deliver one observation. Dropped (returns `false`) while monitoring
    /// is stopped or nobody listens.
    pub fn publish(&self, observation: T) -> bool {
        if !self.is_active() {
            debug!(monitor = self.name, "observation dropped: monitoring stopped");
            return false;
        }
        self.tx.send(observation).is_ok()
    }

    fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            info!(monitor = self.name, active, "monitoring toggled");
        }
    }

    fn stream(&self) -> BoxStream<'static, T> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|r| std::future::ready(r.ok()))
            .boxed()
    }
}

#[async_trait]
impl LocationMonitor for ChannelMonitor<LocationFix> {
    async fn start_monitoring(&self) -> Result<(), MonitorError> {
        self.set_active(true);
        Ok(())
    }

    async fn stop_monitoring(&self) {
        self.set_active(false);
    }

    fn events(&self) -> BoxStream<'static, LocationFix> {
        self.stream()
    }
}

#[async_trait]
impl NetworkMonitor for ChannelMonitor<NetworkObservation> {
    async fn start_monitoring(&self) -> Result<(), MonitorError> {
        self.set_active(true);
        Ok(())
    }

    async fn stop_monitoring(&self) {
        self.set_active(false);
    }

    fn events(&self) -> BoxStream<'static, NetworkObservation> {
        self.stream()
    }
}
