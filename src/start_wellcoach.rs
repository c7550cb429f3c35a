//! Startup helpers for the coach service.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::accelerator::HealthMonitor;
use crate::attachments::RetentionSweeper;
use crate::core::CoachConfig;
use crate::state::AppState;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` refines the default `info` level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Run the coach background services until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting wellcoach v{}", env!("CARGO_PKG_VERSION"));

    let config = CoachConfig::from_env();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!("Service error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Start the health monitor and retention sweeper, then wait for Ctrl-C.
///
/// # Errors
/// Returns an error if state creation fails or the signal handler cannot be installed.
pub async fn serve(config: CoachConfig) -> anyhow::Result<()> {
    let state = AppState::new(config).await?;
    run_until(state, async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")
    })
    .await
}

/// Run the background tasks of `state` until `shutdown_signal` resolves.
///
/// # Errors
/// Returns the error produced by `shutdown_signal`.
pub async fn run_until<F>(state: Arc<AppState>, shutdown_signal: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>> + Send,
{
    let health = state.accelerator.as_ref().map(|client| {
        let monitor = HealthMonitor::new(Arc::clone(client));
        let notify = monitor.shutdown_notifier();
        (notify, monitor.spawn())
    });

    let sweeper = RetentionSweeper::new(Arc::clone(&state.retention), state.config.retention.clone());
    let sweeper_notify = sweeper.shutdown_notifier();
    let sweeper_handle = sweeper.spawn();

    let signal = shutdown_signal.await;
    tracing::info!("Shutting down background tasks");

    sweeper_notify.notify_one();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!("Retention sweeper ended abnormally: {e}");
    }

    if let Some((notify, handle)) = health {
        notify.notify_one();
        if let Err(e) = handle.await {
            tracing::warn!("Health monitor ended abnormally: {e}");
        }
    }

    signal
}
