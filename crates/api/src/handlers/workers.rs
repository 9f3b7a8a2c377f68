//! Handlers for worker presence and claims.
//!
//! Worker-side endpoints (heartbeat, poll, lookup by id) are called by the
//! worker process and carry no user token. Everything else acts on behalf
//! of an authenticated browser user.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use savesync_db::models::operation::Operation;
use savesync_db::models::worker::WorkerSnapshot;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::query::ClientIdParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body naming one worker.
#[derive(Debug, Deserialize)]
pub struct ClientIdRequest {
    pub client_id: String,
}

#[derive(Debug, Serialize)]
pub struct WorkerResponse {
    pub worker: WorkerSnapshot,
}

#[derive(Debug, Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerSnapshot>,
}

/// The caller's claimed worker, if any.
#[derive(Debug, Serialize)]
pub struct MyWorkerResponse {
    pub worker: Option<WorkerSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub operations: Vec<Operation>,
}

// ---------------------------------------------------------------------------
// Worker-side
// ---------------------------------------------------------------------------

/// `POST /worker/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(input): Json<ClientIdRequest>,
) -> AppResult<Json<DataResponse<WorkerResponse>>> {
    let worker = state.coordinator.presence.heartbeat(&input.client_id).await?;
    Ok(Json(DataResponse {
        data: WorkerResponse { worker },
    }))
}

/// `GET /worker/poll?client_id=` -- pending operations, oldest first.
pub async fn poll(
    State(state): State<AppState>,
    Query(params): Query<ClientIdParams>,
) -> AppResult<Json<DataResponse<PollResponse>>> {
    let operations = state.coordinator.queue.poll(&params.client_id).await?;
    Ok(Json(DataResponse {
        data: PollResponse { operations },
    }))
}

/// `GET /worker/{client_id}`
pub async fn get_worker(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> AppResult<Json<DataResponse<WorkerResponse>>> {
    let worker = state.coordinator.presence.get(&client_id).await?;
    Ok(Json(DataResponse {
        data: WorkerResponse { worker },
    }))
}

// ---------------------------------------------------------------------------
// Browser-side
// ---------------------------------------------------------------------------

/// `GET /worker/list`
pub async fn list_workers(
    _user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<WorkersResponse>>> {
    let workers = state.coordinator.presence.list().await?;
    Ok(Json(DataResponse {
        data: WorkersResponse { workers },
    }))
}

/// `GET /worker/mine`
pub async fn my_worker(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MyWorkerResponse>>> {
    let worker = state.coordinator.presence.claimed_by(user.user_id).await?;
    Ok(Json(DataResponse {
        data: MyWorkerResponse { worker },
    }))
}

/// `POST /worker/claim`
pub async fn claim_worker(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ClientIdRequest>,
) -> AppResult<Json<DataResponse<WorkerResponse>>> {
    let worker = state
        .coordinator
        .claims
        .claim(&input.client_id, user.user_id)
        .await?;
    Ok(Json(DataResponse {
        data: WorkerResponse { worker },
    }))
}

/// `POST /worker/unclaim` -- allowed for the linked user or an admin.
pub async fn unclaim_worker(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ClientIdRequest>,
) -> AppResult<Json<DataResponse<WorkerResponse>>> {
    let worker = state
        .coordinator
        .claims
        .unclaim_as(&input.client_id, user.user_id, user.is_admin())
        .await?;
    Ok(Json(DataResponse {
        data: WorkerResponse { worker },
    }))
}

/// `POST /worker/kill-switch` -- release every claim.
pub async fn kill_switch(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<WorkersResponse>>> {
    tracing::warn!(admin_id = admin.user_id, "Kill-switch triggered");
    let workers = state.coordinator.claims.unclaim_all().await?;
    Ok(Json(DataResponse {
        data: WorkersResponse { workers },
    }))
}
