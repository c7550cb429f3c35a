//! Background worker running the retention sweep on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::attachments::retention::{RetentionEvaluator, SweepReport};
use crate::core::config::RetentionConfig;
use crate::core::outcome::Outcome;

/// Periodic retention sweep.
pub struct RetentionSweeper {
    evaluator: Arc<RetentionEvaluator>,
    config: RetentionConfig,
    shutdown: Arc<Notify>,
}

impl RetentionSweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(evaluator: Arc<RetentionEvaluator>, config: RetentionConfig) -> Self {
        Self {
            evaluator,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the sweeper.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the sweeper as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run one sweep now.
    pub async fn run_once(&self) -> Outcome<SweepReport> {
        let outcome = self.evaluator.sweep().await;
        if let Some(reason) = outcome.reason() {
            warn!(reason, "Retention sweep degraded");
        }
        outcome
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Retention sweeper is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.sweep_interval_seconds);
        info!(?interval, "Starting retention sweeper");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    self.run_once().await;
                }
                () = self.shutdown.notified() => {
                    info!("Retention sweeper shutting down");
                    break;
                }
            }
        }
    }
}
