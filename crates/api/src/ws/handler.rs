use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use savesync_core::error::CoreError;

use crate::auth::jwt::validate_token;
use crate::error::{AppError, AppResult};
use crate::notifications::workers_update_message;
use crate::query::WsParams;
use crate::state::AppState;
use crate::ws::manager::Subscription;

/// `GET /ws?token=&watch=workers`
///
/// An absent token yields an anonymous session that only receives
/// broadcasts; a present but invalid token is rejected before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> AppResult<Response> {
    let user_id = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let claims = validate_token(token, &state.config.jwt).map_err(|_| {
                AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
            })?;
            Some(claims.sub)
        }
        None => None,
    };
    let subscription = Subscription {
        user_id,
        watch_workers: params.watch.as_deref() == Some("workers"),
    };

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, subscription))
        .into_response())
}

/// Drive one connection: register it, forward queued messages to the sink,
/// and read until the client goes away.
async fn handle_socket(socket: WebSocket, state: AppState, subscription: Subscription) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        conn_id = %conn_id,
        user_id = ?subscription.user_id,
        watch_workers = subscription.watch_workers,
        "WebSocket connected",
    );

    let ws_manager = state.ws_manager.clone();
    let mut rx = ws_manager.add(conn_id.clone(), subscription).await;

    // Watchers start from a full snapshot instead of waiting for the next change.
    if subscription.watch_workers {
        match workers_update_message(&state.coordinator).await {
            Ok(msg) => {
                ws_manager.send_to(&conn_id, msg).await;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "Initial worker snapshot failed");
            }
        }
    }

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Inbound messages carry no commands; only liveness matters.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
