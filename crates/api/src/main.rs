use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use savesync_core::clock::SystemClock;
use savesync_db::{MemoryStore, OperationStore, PgStore, PresenceStore};
use savesync_dispatch::Coordinator;
use savesync_events::EventBus;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use savesync_api::background;
use savesync_api::config::ServerConfig;
use savesync_api::notifications::RealtimeNotifier;
use savesync_api::router::build_app_router;
use savesync_api::state::AppState;
use savesync_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "savesync_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let (presence_store, operation_store) = open_stores(&config).await;

    // --- Dispatch ---
    let event_bus = Arc::new(EventBus::default());
    let coordinator = Arc::new(Coordinator::new(
        presence_store,
        operation_store,
        Arc::clone(&event_bus),
        Arc::new(SystemClock),
        config.dispatch.clone(),
    ));

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let notifier = RealtimeNotifier::new(Arc::clone(&coordinator), Arc::clone(&ws_manager));
    let mut handles = vec![tokio::spawn(
        notifier.run(event_bus.subscribe(), cancel.clone()),
    )];
    handles.push(tokio::spawn(background::timeout_sweep::run(
        Arc::clone(&coordinator),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(background::presence_monitor::run(
        Arc::clone(&coordinator),
        cancel.clone(),
    )));
    handles.push(tokio::spawn(background::operation_cleanup::run(
        Arc::clone(&coordinator),
        cancel.clone(),
    )));
    tracing::info!(
        "Background tasks started (notifier, timeout sweep, presence monitor, operation cleanup)"
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        coordinator: Arc::clone(&coordinator),
        ws_manager: Arc::clone(&ws_manager),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    for handle in handles {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!("Background task did not stop in time");
        }
    }
    tracing::info!("Background tasks stopped");

    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise the process-local store.
async fn open_stores(config: &ServerConfig) -> (Arc<dyn PresenceStore>, Arc<dyn OperationStore>) {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory store (state is lost on restart)");
        let store = Arc::new(MemoryStore::new());
        return (store.clone(), store);
    };

    let pool = savesync_db::create_pool(database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    savesync_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    savesync_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool));
    (store.clone(), store)
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
