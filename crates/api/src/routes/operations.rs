//! Route definitions for operations and batches.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::operations;
use crate::state::AppState;

/// Routes mounted at `/operations`.
///
/// ```text
/// GET  /                       -> list_operations   (?limit=)
/// POST /enqueue                -> enqueue
/// POST /aggregate              -> aggregate
/// GET  /batches/{batch_id}     -> batch_summary
/// GET  /{id}/status            -> operation_status
/// POST /{id}/start             -> start             (worker, ?client_id=)
/// POST /{id}/progress          -> progress          (worker, ?client_id=)
/// POST /{id}/complete          -> complete          (worker, ?client_id=)
/// POST /{id}/fail              -> fail              (worker, ?client_id=)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(operations::list_operations))
        .route("/enqueue", post(operations::enqueue))
        .route("/aggregate", post(operations::aggregate))
        .route("/batches/{batch_id}", get(operations::batch_summary))
        .route("/{id}/status", get(operations::operation_status))
        .route("/{id}/start", post(operations::start))
        .route("/{id}/progress", post(operations::progress))
        .route("/{id}/complete", post(operations::complete))
        .route("/{id}/fail", post(operations::fail))
}
