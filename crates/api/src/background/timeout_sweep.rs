//! Watchdog that fails operations whose worker stopped reporting.

use std::sync::Arc;

use savesync_dispatch::Coordinator;
use tokio_util::sync::CancellationToken;

/// Run the timeout sweep every `sweep_interval` until `cancel` fires.
pub async fn run(coordinator: Arc<Coordinator>, cancel: CancellationToken) {
    let max_age = coordinator.config.operation_timeout;
    let period = coordinator.config.sweep_interval;

    tracing::info!(
        max_age_secs = max_age.as_secs(),
        interval_secs = period.as_secs(),
        "Timeout sweep started"
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Timeout sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match coordinator.operations.sweep_timeouts(max_age).await {
                    Ok(timed_out) if !timed_out.is_empty() => {
                        tracing::info!(count = timed_out.len(), "Timeout sweep: failed stale operations");
                    }
                    Ok(_) => {
                        tracing::debug!("Timeout sweep: nothing stale");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Timeout sweep failed");
                    }
                }
            }
        }
    }
}
