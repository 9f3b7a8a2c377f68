//! Handlers for the operation lifecycle.
//!
//! Browser-side: enqueue, status polling, listing, batch aggregation.
//! Worker-side: start, progress, complete, fail. Report endpoints accept an
//! optional `?client_id=`; when present it must be the operation's target.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use savesync_core::batch::BatchSummary;
use savesync_core::error::CoreError;
use savesync_core::operation::{OperationKind, OperationStatus, Progress};
use savesync_core::types::{BatchId, OperationId, Timestamp, UserId};
use savesync_db::models::operation::Operation;
use savesync_dispatch::Transition;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::{LimitParams, ReporterParams};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Exactly one of `payload` (single operation) or `payloads` (one sibling
/// per entry, grouped under a new batch id) may be given. Neither means a
/// single operation with an empty payload.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub target_client_id: String,
    pub kind: String,
    pub payload: Option<serde_json::Value>,
    pub payloads: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_ids: Option<Vec<OperationId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
}

#[derive(Debug, Serialize)]
pub struct OperationsResponse {
    pub operations: Vec<Operation>,
}

/// Poll view of one operation.
#[derive(Debug, Serialize)]
pub struct OperationStatusResponse {
    pub operation_id: OperationId,
    pub status: OperationStatus,
    pub completed: bool,
    pub failed: bool,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub batch_id: Option<BatchId>,
    pub updated_at: Timestamp,
}

impl From<Operation> for OperationStatusResponse {
    fn from(op: Operation) -> Self {
        Self {
            operation_id: op.operation_id,
            status: op.status,
            completed: op.status == OperationStatus::Completed,
            failed: op.status == OperationStatus::Failed,
            progress: op.progress,
            error: op.error,
            batch_id: op.batch_id,
            updated_at: op.updated_at,
        }
    }
}

/// Outcome of a worker report. `applied` is false for ignored duplicates.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub applied: bool,
    pub operation: Operation,
}

impl From<Transition> for TransitionResponse {
    fn from(t: Transition) -> Self {
        Self {
            applied: t.applied(),
            operation: t.into_operation(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub current: i64,
    pub total: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub operation_ids: Vec<OperationId>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn authorize_reporter(
    state: &AppState,
    id: OperationId,
    params: &ReporterParams,
) -> AppResult<()> {
    if let Some(client_id) = params.client_id.as_deref() {
        state
            .coordinator
            .operations
            .authorize_reporter(id, client_id)
            .await?;
    }
    Ok(())
}

/// Admins see every batch; everyone else only their own.
fn viewer(user: &AuthUser) -> Option<UserId> {
    if user.is_admin() {
        None
    } else {
        Some(user.user_id)
    }
}

// ---------------------------------------------------------------------------
// Browser-side
// ---------------------------------------------------------------------------

/// `POST /operations/enqueue`
pub async fn enqueue(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<EnqueueRequest>,
) -> AppResult<impl IntoResponse> {
    let kind: OperationKind = input.kind.parse()?;
    let queue = &state.coordinator.queue;

    let response = match (input.payload, input.payloads) {
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest(
                "Provide either payload or payloads, not both".into(),
            ));
        }
        (_, Some(payloads)) => {
            let enqueued = queue
                .enqueue_batch(&input.target_client_id, kind, user.user_id, payloads)
                .await?;
            EnqueueResponse {
                operation_id: None,
                operation_ids: Some(
                    enqueued.operations.iter().map(|op| op.operation_id).collect(),
                ),
                batch_id: enqueued.batch_id,
            }
        }
        (payload, None) => {
            let op = queue
                .enqueue(
                    &input.target_client_id,
                    kind,
                    user.user_id,
                    payload.unwrap_or(serde_json::Value::Null),
                )
                .await?;
            EnqueueResponse {
                operation_id: Some(op.operation_id),
                operation_ids: None,
                batch_id: None,
            }
        }
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: response })))
}

/// `GET /operations?limit=` -- the caller's most recent operations.
pub async fn list_operations(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<DataResponse<OperationsResponse>>> {
    let operations = state
        .coordinator
        .queue
        .list_recent(user.user_id, params.limit)
        .await?;
    Ok(Json(DataResponse {
        data: OperationsResponse { operations },
    }))
}

/// `GET /operations/{id}/status`
pub async fn operation_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<OperationId>,
) -> AppResult<Json<DataResponse<OperationStatusResponse>>> {
    let op = state.coordinator.operations.get(id).await?;
    if op.owner_user != user.user_id && !user.is_admin() {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Operation {id} belongs to another user"
        ))));
    }
    Ok(Json(DataResponse { data: op.into() }))
}

/// `GET /operations/batches/{batch_id}`
pub async fn batch_summary(
    user: AuthUser,
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
) -> AppResult<Json<DataResponse<BatchSummary>>> {
    let summary = state
        .coordinator
        .batches
        .summarize_batch(batch_id, viewer(&user))
        .await?;
    Ok(Json(DataResponse { data: summary }))
}

/// `POST /operations/aggregate`
pub async fn aggregate(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<AggregateRequest>,
) -> AppResult<Json<DataResponse<BatchSummary>>> {
    let summary = state
        .coordinator
        .batches
        .summarize_operations(&input.operation_ids, viewer(&user))
        .await?;
    Ok(Json(DataResponse { data: summary }))
}

// ---------------------------------------------------------------------------
// Worker-side
// ---------------------------------------------------------------------------

/// `POST /operations/{id}/start`
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<OperationId>,
    Query(params): Query<ReporterParams>,
) -> AppResult<Json<DataResponse<TransitionResponse>>> {
    authorize_reporter(&state, id, &params).await?;
    let transition = state.coordinator.operations.start(id).await?;
    Ok(Json(DataResponse {
        data: transition.into(),
    }))
}

/// `POST /operations/{id}/progress`
pub async fn progress(
    State(state): State<AppState>,
    Path(id): Path<OperationId>,
    Query(params): Query<ReporterParams>,
    Json(input): Json<ProgressRequest>,
) -> AppResult<Json<DataResponse<TransitionResponse>>> {
    authorize_reporter(&state, id, &params).await?;
    let operation = state
        .coordinator
        .operations
        .report_progress(id, input.current, input.total, input.message)
        .await?;
    Ok(Json(DataResponse {
        data: TransitionResponse {
            applied: true,
            operation,
        },
    }))
}

/// `POST /operations/{id}/complete`
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<OperationId>,
    Query(params): Query<ReporterParams>,
) -> AppResult<Json<DataResponse<TransitionResponse>>> {
    authorize_reporter(&state, id, &params).await?;
    let transition = state.coordinator.operations.complete(id).await?;
    Ok(Json(DataResponse {
        data: transition.into(),
    }))
}

/// `POST /operations/{id}/fail`
pub async fn fail(
    State(state): State<AppState>,
    Path(id): Path<OperationId>,
    Query(params): Query<ReporterParams>,
    Json(input): Json<FailRequest>,
) -> AppResult<Json<DataResponse<TransitionResponse>>> {
    authorize_reporter(&state, id, &params).await?;
    let transition = state.coordinator.operations.fail(id, &input.error).await?;
    Ok(Json(DataResponse {
        data: transition.into(),
    }))
}
