use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use savesync_core::error::CoreError;
use savesync_db::StoreError;
use savesync_dispatch::DispatchError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps domain, dispatch and store errors and maps each to an HTTP status
/// with a JSON body of the form `{ "error": "...", "code": "..." }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Core(core) => classify_core(core),
            AppError::Dispatch(dispatch) => classify_dispatch(dispatch),
            AppError::Store(store) => classify_store(store),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

fn classify_core(err: CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal server error");
            internal()
        }
    }
}

fn classify_dispatch(err: DispatchError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        DispatchError::WorkerNotFound(_)
        | DispatchError::OperationNotFound(_)
        | DispatchError::BatchNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        DispatchError::AlreadyClaimed(_)
        | DispatchError::UserAlreadyHasWorker(_)
        | DispatchError::InvalidTransition { .. } => (StatusCode::CONFLICT, "CONFLICT", message),
        DispatchError::WorkerOffline(_) => (StatusCode::CONFLICT, "WORKER_OFFLINE", message),
        DispatchError::WorkerNotClaimedByOwner(_) => {
            (StatusCode::FORBIDDEN, "WORKER_NOT_CLAIMED", message)
        }
        DispatchError::Core(core) => classify_core(core),
        DispatchError::Store(store) => classify_store(store),
    }
}

/// Backend failures are reported as retryable; corrupt rows are a server bug.
fn classify_store(err: StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Corrupt(msg) => {
            tracing::error!(error = %msg, "Corrupt record in store");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Store temporarily unavailable, retry later".to_string(),
            )
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
