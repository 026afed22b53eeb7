//! Notification preference handlers
//!
//! Preferences are created lazily with defaults on first read, merged on
//! update, and reset by delete-and-recreate.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::database::store::PreferenceStore;
use crate::error::Result;
use crate::models::preference::{NotificationPreference, UpdatePreferencesRequest};

use super::response::ApiResponse;

/// Get notification preferences, creating defaults on first access
/// GET /api/v1/users/{user_id}/notification-preferences
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/notification-preferences",
    tag = "preferences",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Notification preferences", body = NotificationPreference),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<NotificationPreference>>> {
    if let Some(preference) = state.preferences.find(user_id).await? {
        return Ok(Json(ApiResponse::success(preference)));
    }

    let preference = NotificationPreference::defaults(user_id, Utc::now());
    state.preferences.upsert(&preference).await?;
    info!(user_id = %user_id, "created default notification preferences");
    Ok(Json(ApiResponse::success(preference)))
}

/// Update notification preferences; absent sections are kept
/// PUT /api/v1/users/{user_id}/notification-preferences
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/notification-preferences",
    tag = "preferences",
    request_body = UpdatePreferencesRequest,
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Preferences updated", body = NotificationPreference),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<ApiResponse<NotificationPreference>>> {
    let now = Utc::now();
    let mut preference = state
        .preferences
        .find(user_id)
        .await?
        .unwrap_or_else(|| NotificationPreference::defaults(user_id, now));

    payload.apply(&mut preference, now);
    state.preferences.upsert(&preference).await?;
    info!(user_id = %user_id, "notification preferences updated");
    Ok(Json(ApiResponse::success(preference)))
}

/// Reset notification preferences to defaults
/// DELETE /api/v1/users/{user_id}/notification-preferences
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/notification-preferences",
    tag = "preferences",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Preferences reset to defaults", body = NotificationPreference)
    )
)]
pub async fn reset_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<NotificationPreference>>> {
    state.preferences.delete(user_id).await?;
    let preference = NotificationPreference::defaults(user_id, Utc::now());
    state.preferences.upsert(&preference).await?;
    info!(user_id = %user_id, "notification preferences reset to defaults");
    Ok(Json(ApiResponse::success(preference)))
}
