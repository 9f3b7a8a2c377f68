//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?limit=` for listing endpoints. Clamped by the dispatch queue.
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

/// `?client_id=` identifying a worker.
#[derive(Debug, Deserialize)]
pub struct ClientIdParams {
    pub client_id: String,
}

/// Optional `?client_id=` on worker report endpoints. When present it must
/// match the operation's target worker.
#[derive(Debug, Deserialize)]
pub struct ReporterParams {
    pub client_id: Option<String>,
}

/// `?token=&watch=` on the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
    pub watch: Option<String>,
}
