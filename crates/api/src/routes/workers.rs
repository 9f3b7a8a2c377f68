//! Route definitions for worker presence and claims.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::workers;
use crate::state::AppState;

/// Routes mounted at `/worker`.
///
/// Worker-side routes carry no user token; browser-side routes require a
/// Bearer token (enforced by handler extractors), `kill-switch` the admin role.
///
/// ```text
/// POST /heartbeat     -> heartbeat        (worker)
/// GET  /poll          -> poll             (worker, ?client_id=)
/// GET  /list          -> list_workers
/// GET  /mine          -> my_worker
/// POST /claim         -> claim_worker
/// POST /unclaim       -> unclaim_worker
/// POST /kill-switch   -> kill_switch      (admin)
/// GET  /{client_id}   -> get_worker       (worker)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/heartbeat", post(workers::heartbeat))
        .route("/poll", get(workers::poll))
        .route("/list", get(workers::list_workers))
        .route("/mine", get(workers::my_worker))
        .route("/claim", post(workers::claim_worker))
        .route("/unclaim", post(workers::unclaim_worker))
        .route("/kill-switch", post(workers::kill_switch))
        .route("/{client_id}", get(workers::get_worker))
}
