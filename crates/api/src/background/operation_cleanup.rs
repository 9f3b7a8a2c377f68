//! Periodic deletion of finished operations past their retention.

use std::sync::Arc;

use savesync_dispatch::Coordinator;
use tokio_util::sync::CancellationToken;

/// Run the cleanup every `cleanup_interval` until `cancel` fires.
///
/// Pending and in-progress operations are never touched.
pub async fn run(coordinator: Arc<Coordinator>, cancel: CancellationToken) {
    let retention = coordinator.config.operation_retention;
    let period = coordinator.config.cleanup_interval;

    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = period.as_secs(),
        "Operation cleanup job started"
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Operation cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                match coordinator.operations.cleanup_finished(retention).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Operation cleanup: purged finished operations");
                        } else {
                            tracing::debug!("Operation cleanup: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Operation cleanup failed");
                    }
                }
            }
        }
    }
}
