//! Channel administration handlers
//!
//! Create/update/delete/test channels, set the per-type default, and read
//! delivery statistics. Consumed by the admin surface.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::database::store::ChannelStore;
use crate::error::{ApiError, Result};
use crate::models::channel::{
    ChannelConfig, ChannelStats, ChannelStatus, CreateChannelRequest, UpdateChannelRequest,
};

use super::response::{ApiResponse, Created, NoContent};

/// Create a delivery channel
/// POST /api/v1/admin/channels
#[utoipa::path(
    post,
    path = "/api/v1/admin/channels",
    tag = "channels",
    request_body = CreateChannelRequest,
    responses(
        (status = 201, description = "Channel created", body = ChannelConfig),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Channel name already exists")
    )
)]
pub async fn create_channel(
    State(state): State<AppState>,
    Json(payload): Json<CreateChannelRequest>,
) -> Result<Created<ChannelConfig>> {
    payload.validate()?;

    let now = Utc::now();
    let channel = ChannelConfig {
        id: Uuid::new_v4(),
        name: payload.name,
        display_name: payload.display_name,
        channel_type: payload.channel_type,
        provider: payload.provider,
        config: payload.config.unwrap_or_else(|| serde_json::json!({})),
        // channels start in testing until an admin test promotes them
        status: ChannelStatus::Testing,
        error_message: None,
        tags: payload.tags.unwrap_or_default(),
        stats: ChannelStats::default(),
        last_tested_at: None,
        created_at: now,
        updated_at: now,
    };
    state.channels.insert(&channel).await?;
    info!(channel = %channel.name, channel_type = %channel.channel_type, "channel created");
    Ok(Created(channel))
}

/// List all channels
/// GET /api/v1/admin/channels
#[utoipa::path(
    get,
    path = "/api/v1/admin/channels",
    tag = "channels",
    responses((status = 200, description = "Configured channels", body = [ChannelConfig]))
)]
pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ChannelConfig>>>> {
    let channels = state.channels.list().await?;
    Ok(Json(ApiResponse::success(channels)))
}

/// Get a channel by name
/// GET /api/v1/admin/channels/{name}
#[utoipa::path(
    get,
    path = "/api/v1/admin/channels/{name}",
    tag = "channels",
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Channel", body = ChannelConfig),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ChannelConfig>>> {
    let channel = state
        .channels
        .find_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel"))?;
    Ok(Json(ApiResponse::success(channel)))
}

/// Update a channel; absent fields are kept
/// PUT /api/v1/admin/channels/{name}
#[utoipa::path(
    put,
    path = "/api/v1/admin/channels/{name}",
    tag = "channels",
    request_body = UpdateChannelRequest,
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Channel updated", body = ChannelConfig),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn update_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<UpdateChannelRequest>,
) -> Result<Json<ApiResponse<ChannelConfig>>> {
    let mut channel = state
        .channels
        .find_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel"))?;

    if let Some(display_name) = payload.display_name {
        channel.display_name = display_name;
    }
    if let Some(provider) = payload.provider {
        channel.provider = provider;
    }
    if let Some(config) = payload.config {
        channel.config = config;
    }
    if let Some(status) = payload.status {
        channel.status = status;
    }
    if let Some(tags) = payload.tags {
        channel.tags = tags;
    }
    channel.updated_at = Utc::now();

    state.channels.update(&channel).await?;
    // the next dispatch rebuilds the provider client from fresh config
    state.registry.invalidate(&name);
    info!(channel = %name, "channel updated");
    Ok(Json(ApiResponse::success(channel)))
}

/// Delete a channel
/// DELETE /api/v1/admin/channels/{name}
#[utoipa::path(
    delete,
    path = "/api/v1/admin/channels/{name}",
    tag = "channels",
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 204, description = "Channel deleted"),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<NoContent> {
    if !state.channels.delete(&name).await? {
        return Err(ApiError::not_found("Channel"));
    }
    state.registry.invalidate(&name);
    info!(channel = %name, "channel deleted");
    Ok(NoContent)
}

/// Test a channel by initializing its provider adapter
/// POST /api/v1/admin/channels/{name}/test
#[utoipa::path(
    post,
    path = "/api/v1/admin/channels/{name}/test",
    tag = "channels",
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Channel tested; status reflects the result", body = ChannelConfig),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn test_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ChannelConfig>>> {
    let channel = state.registry.test_channel(&name).await?;
    Ok(Json(ApiResponse::success(channel)))
}

/// Mark a channel as its type's default
/// POST /api/v1/admin/channels/{name}/default
#[utoipa::path(
    post,
    path = "/api/v1/admin/channels/{name}/default",
    tag = "channels",
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Channel set as default", body = ChannelConfig),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn set_default_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ChannelConfig>>> {
    let channel = state
        .channels
        .find_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel"))?;
    let updated = state
        .channels
        .set_default(channel.channel_type, &name)
        .await?;
    info!(channel = %name, channel_type = %updated.channel_type, "channel set as default");
    Ok(Json(ApiResponse::success(updated)))
}

/// Get a channel's delivery statistics
/// GET /api/v1/admin/channels/{name}/stats
#[utoipa::path(
    get,
    path = "/api/v1/admin/channels/{name}/stats",
    tag = "channels",
    params(("name" = String, Path, description = "Channel name")),
    responses(
        (status = 200, description = "Delivery statistics", body = ChannelStats),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn get_channel_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let channel = state
        .channels
        .find_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel"))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "name": channel.name,
            "status": channel.status,
            "stats": channel.stats,
            "last_tested_at": channel.last_tested_at,
        }
    })))
}
