pub mod health;
pub mod operations;
pub mod workers;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                 WebSocket push channel (?token=&watch=workers)
/// /worker/...         presence, claims, worker poll
/// /operations/...     enqueue, status, batches, worker reports
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/worker", workers::router())
        .nest("/operations", operations::router())
}
