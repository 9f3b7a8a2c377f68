//! `savesync-worker` -- executes dispatched save-file operations.
//!
//! Heartbeats to the savesync server, polls for operations targeted at this
//! machine, and runs them against the local save storage.
//!
//! See [`WorkerConfig::from_env`](savesync_worker::config::WorkerConfig::from_env)
//! for the environment variables.

use std::sync::Arc;

use savesync_worker::client::DispatchClient;
use savesync_worker::config::WorkerConfig;
use savesync_worker::identity;
use savesync_worker::runner::Runner;
use savesync_worker::transport::LocalTransport;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "savesync_worker=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = WorkerConfig::from_env();
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(identity::detect_client_id);

    if let Err(e) = savesync_core::presence::validate_client_id(&client_id) {
        tracing::error!(client_id = %client_id, error = %e, "Invalid client id");
        std::process::exit(1);
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.storage_dir).await {
        tracing::error!(
            path = %config.storage_dir.display(),
            error = %e,
            "Cannot create save storage directory"
        );
        std::process::exit(1);
    }

    tracing::info!(
        client_id = %client_id,
        server_url = %config.server_url,
        storage_dir = %config.storage_dir.display(),
        "Starting savesync-worker",
    );

    let client = DispatchClient::new(config.server_url.clone(), client_id);
    let transport = Arc::new(LocalTransport::new(config.storage_dir.clone()));
    let runner = Runner::new(
        client,
        transport,
        config.heartbeat_interval,
        config.progress_min_interval,
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.run(config.poll_interval, cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Worker loop panicked");
    }
    tracing::info!("Worker stopped");
}
