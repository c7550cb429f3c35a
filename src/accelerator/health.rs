//! Accelerator health tracking and background polling.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::accelerator::client::AcceleratorClient;

/// Observable accelerator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceleratorStatus {
    /// Switched off in configuration.
    Disabled,
    /// Enabled, never checked.
    Unchecked,
    /// Last check succeeded and is recent.
    Healthy,
    /// Last check failed.
    Unhealthy,
    /// Last check is older than the stale window.
    Stale,
}

impl AcceleratorStatus {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Unchecked => "unchecked",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for AcceleratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result and time of the latest health check.
#[derive(Debug)]
pub struct HealthState {
    healthy: AtomicBool,
    last_check_millis: AtomicI64,
}

const NEVER_CHECKED: i64 = i64::MIN;

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(false),
            last_check_millis: AtomicI64::new(NEVER_CHECKED),
        }
    }
}

impl HealthState {
    /// Record a health check result. Returns the previous healthy flag.
    pub fn record(&self, healthy: bool, at: DateTime<Utc>) -> bool {
        self.last_check_millis
            .store(at.timestamp_millis(), Ordering::SeqCst);
        self.healthy.swap(healthy, Ordering::SeqCst)
    }

    /// Evaluate the state at `now`.
    #[must_use]
    pub fn status(&self, enabled: bool, now: DateTime<Utc>, stale_after: TimeDelta) -> AcceleratorStatus {
        if !enabled {
            return AcceleratorStatus::Disabled;
        }

        let last = self.last_check_millis.load(Ordering::SeqCst);
        if last == NEVER_CHECKED {
            return AcceleratorStatus::Unchecked;
        }

        let Some(checked_at) = DateTime::<Utc>::from_timestamp_millis(last) else {
            return AcceleratorStatus::Unchecked;
        };
        if now.signed_duration_since(checked_at) > stale_after {
            return AcceleratorStatus::Stale;
        }

        if self.healthy.load(Ordering::SeqCst) {
            AcceleratorStatus::Healthy
        } else {
            AcceleratorStatus::Unhealthy
        }
    }
}

/// Background task re-checking accelerator health on a fixed interval.
pub struct HealthMonitor {
    client: Arc<AcceleratorClient>,
    shutdown: Arc<Notify>,
}

impl HealthMonitor {
    /// Create a monitor for `client`.
    #[must_use]
    pub fn new(client: Arc<AcceleratorClient>) -> Self {
        Self {
            client,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the monitor.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the monitor as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.client.config().enabled {
            info!("Accelerator disabled, health monitor not started");
            return;
        }

        let interval = self.client.config().health_check_interval;
        info!(?interval, "Starting accelerator health monitor");

        loop {
            let healthy = self.client.check_health().await;
            debug!(healthy, "Accelerator health polled");

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = self.shutdown.notified() => {
                    info!("Accelerator health monitor shutting down");
                    break;
                }
            }
        }
    }
}
