//! Notification handlers
//!
//! Create-and-send, batch send, listing, read/archive/delete state
//! changes, the live in-app stream, and the admin sweep triggers.

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::error::{ApiError, Result};
use crate::models::notification::{
    BatchSendRequest, CreateNotificationRequest, ListNotificationsQuery, Notification,
    NotificationListResponse,
};
use crate::services::orchestrator::{BatchSendResult, SendResult, SweepReport};

use super::response::{ApiResponse, Created, NoContent};

/// Create and send a notification
/// POST /api/v1/notifications
#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification accepted", body = SendResult),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Template not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_notification(
    State(state): State<AppState>,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<Created<SendResult>> {
    let result = state.orchestrator.create_and_send(payload).await?;
    Ok(Created(result))
}

/// Send a batch of notifications
/// POST /api/v1/notifications/batch
#[utoipa::path(
    post,
    path = "/api/v1/notifications/batch",
    tag = "notifications",
    request_body = BatchSendRequest,
    responses(
        (status = 200, description = "Batch processed", body = BatchSendResult),
        (status = 400, description = "Validation error"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn send_batch(
    State(state): State<AppState>,
    Json(payload): Json<BatchSendRequest>,
) -> Result<Json<ApiResponse<BatchSendResult>>> {
    payload.validate()?;
    let result = state.orchestrator.send_batch(payload.notifications).await;
    Ok(Json(ApiResponse::success(result)))
}

/// Get a notification by id
/// GET /api/v1/notifications/{id}
#[utoipa::path(
    get,
    path = "/api/v1/notifications/{id}",
    tag = "notifications",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification", body = Notification),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Notification>>> {
    let notification = state.orchestrator.get_notification(id).await?;
    Ok(Json(ApiResponse::success(notification)))
}

/// List a user's notifications
/// GET /api/v1/users/{user_id}/notifications
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/notifications",
    tag = "notifications",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("limit" = Option<i64>, Query, description = "Max notifications to return"),
        ("offset" = Option<i64>, Query, description = "Offset for pagination"),
        ("unread_only" = Option<bool>, Query, description = "Only return unread notifications")
    ),
    responses(
        (status = 200, description = "List of notifications", body = NotificationListResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListNotificationsQuery>,
) -> Result<Json<NotificationListResponse>> {
    let response = state
        .orchestrator
        .list_user_notifications(user_id, &params)
        .await?;
    Ok(Json(response))
}

/// Count a user's unread notifications
/// GET /api/v1/users/{user_id}/notifications/unread-count
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/notifications/unread-count",
    tag = "notifications",
    params(("user_id" = Uuid, Path, description = "Recipient user ID")),
    responses((status = 200, description = "Unread count"))
)]
pub async fn count_unread(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let count = state.orchestrator.count_unread(user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "unread_count": count }
    })))
}

/// Mark a notification as read
/// PUT /api/v1/users/{user_id}/notifications/{id}/read
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/notifications/{id}/read",
    tag = "notifications",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 404, description = "Notification not found"),
        (status = 409, description = "Notification cannot be marked read yet")
    )
)]
pub async fn mark_as_read(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Notification>>> {
    let notification = state.orchestrator.mark_read(id, user_id).await?;
    Ok(Json(ApiResponse::success(notification)))
}

/// Mark all notifications as read
/// PUT /api/v1/users/{user_id}/notifications/read-all
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/notifications/read-all",
    tag = "notifications",
    params(("user_id" = Uuid, Path, description = "Recipient user ID")),
    responses((status = 200, description = "All notifications marked as read"))
)]
pub async fn mark_all_as_read(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let affected = state.orchestrator.mark_all_read(user_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("{} notifications marked as read", affected)
    })))
}

/// Archive a notification
/// PUT /api/v1/users/{user_id}/notifications/{id}/archive
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/notifications/{id}/archive",
    tag = "notifications",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification archived", body = Notification),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn archive_notification(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Notification>>> {
    let notification = state.orchestrator.archive(id, user_id).await?;
    Ok(Json(ApiResponse::success(notification)))
}

/// Delete a notification
/// DELETE /api/v1/users/{user_id}/notifications/{id}
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/notifications/{id}",
    tag = "notifications",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<NoContent> {
    state.orchestrator.delete(id, user_id).await?;
    Ok(NoContent)
}

#[derive(Debug, Deserialize)]
pub struct SweepParams {
    pub limit: Option<i64>,
}

/// Dispatch due scheduled notifications
/// POST /api/v1/admin/notifications/process-scheduled
#[utoipa::path(
    post,
    path = "/api/v1/admin/notifications/process-scheduled",
    tag = "admin",
    params(("limit" = Option<i64>, Query, description = "Max notifications per sweep")),
    responses((status = 200, description = "Sweep report", body = SweepReport))
)]
pub async fn process_scheduled(
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> Result<Json<ApiResponse<SweepReport>>> {
    let limit = params
        .limit
        .unwrap_or(state.config.dispatch.sweep_batch_size);
    if limit <= 0 {
        return Err(ApiError::validation_field("limit", "limit must be positive"));
    }
    let report = state.orchestrator.process_scheduled(limit).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Archive expired notifications
/// POST /api/v1/admin/notifications/process-expired
#[utoipa::path(
    post,
    path = "/api/v1/admin/notifications/process-expired",
    tag = "admin",
    params(("limit" = Option<i64>, Query, description = "Max notifications per sweep")),
    responses((status = 200, description = "Sweep report", body = SweepReport))
)]
pub async fn process_expired(
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> Result<Json<ApiResponse<SweepReport>>> {
    let limit = params
        .limit
        .unwrap_or(state.config.dispatch.sweep_batch_size);
    if limit <= 0 {
        return Err(ApiError::validation_field("limit", "limit must be positive"));
    }
    let report = state.orchestrator.process_expired(limit).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Live in-app notification stream
/// GET /api/v1/users/{user_id}/notifications/stream
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/notifications/stream",
    tag = "notifications",
    params(("user_id" = Uuid, Path, description = "Recipient user ID")),
    responses((status = 101, description = "WebSocket connection upgraded"))
)]
pub async fn stream_notifications(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state, user_id))
}

async fn handle_stream(socket: WebSocket, state: AppState, user_id: Uuid) {
    info!(user_id = %user_id, "in-app notification stream opened");
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.in_app.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) if event.user_id == user_id => {
                        let payload = serde_json::json!({
                            "type": "notification",
                            "data": event.notification,
                        });
                        if sender
                            .send(Message::Text(payload.to_string().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user_id = %user_id, skipped, "in-app stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(user_id = %user_id, error = %e, "in-app stream error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    info!(user_id = %user_id, "in-app notification stream closed");
}
