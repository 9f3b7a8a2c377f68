//! Periodic presence housekeeping: offline announcements, idle-claim
//! expiry, and eviction of long-gone unclaimed workers.

use std::sync::Arc;

use savesync_dispatch::Coordinator;
use tokio_util::sync::CancellationToken;

pub async fn run(coordinator: Arc<Coordinator>, cancel: CancellationToken) {
    let period = coordinator.config.presence_check_interval;
    let mut monitor = coordinator.presence_monitor();

    tracing::info!(
        interval_secs = period.as_secs(),
        claim_idle_expiry_secs = coordinator.config.claim_idle_expiry.map(|d| d.as_secs()),
        "Presence monitor started"
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Presence monitor stopping");
                break;
            }
            _ = interval.tick() => {
                match monitor.check().await {
                    Ok(check) if !check.is_empty() => {
                        tracing::info!(
                            went_offline = check.went_offline.len(),
                            claims_expired = check.claims_expired.len(),
                            evicted = check.evicted.len(),
                            "Presence monitor: changes detected"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Presence check failed");
                    }
                }
            }
        }
    }
}
