use std::sync::Arc;

use savesync_dispatch::Coordinator;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (JWT secret, dispatch timeouts, ...).
    pub config: Arc<ServerConfig>,
    /// Dispatch services over the selected store backend.
    pub coordinator: Arc<Coordinator>,
    /// WebSocket connection manager.
    pub ws_manager: Arc<WsManager>,
}
