//! Template administration handlers
//!
//! Creating a template under an existing name produces the next version,
//! links its predecessor and deactivates it; superseded versions remain
//! queryable by explicit version number.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::database::store::TemplateStore;
use crate::error::{ApiError, Result};
use crate::models::template::{CreateTemplateRequest, NotificationTemplate, TemplateVersionQuery};

use super::response::{ApiResponse, Created};

/// Create a template or a new version of an existing name
/// POST /api/v1/admin/templates
#[utoipa::path(
    post,
    path = "/api/v1/admin/templates",
    tag = "templates",
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = NotificationTemplate),
        (status = 400, description = "Validation error")
    )
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<Created<NotificationTemplate>> {
    payload.validate()?;

    let now = Utc::now();
    let previous = state.templates.latest_version(&payload.name).await?;
    let (version, previous_version) = match &previous {
        Some(t) => (t.version + 1, Some(t.version)),
        None => (1, None),
    };

    let template = NotificationTemplate {
        id: Uuid::new_v4(),
        name: payload.name,
        display_name: payload.display_name,
        description: payload.description,
        notification_type: payload.notification_type,
        category: payload.category,
        title_template: payload.title_template,
        message_template: payload.message_template,
        default_priority: payload.default_priority.unwrap_or_default(),
        channels: payload.channels.unwrap_or_default(),
        actions: payload.actions.unwrap_or_default(),
        variables: payload.variables.unwrap_or_default(),
        is_active: true,
        version,
        previous_version,
        created_at: now,
        updated_at: now,
    };

    state.templates.insert(&template).await?;
    if let Some(previous) = previous {
        state.templates.deactivate(previous.id).await?;
    }

    info!(template = %template.name, version, "template created");
    Ok(Created(template))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTemplatesQuery {
    pub active_only: Option<bool>,
}

/// List templates
/// GET /api/v1/admin/templates
#[utoipa::path(
    get,
    path = "/api/v1/admin/templates",
    tag = "templates",
    params(("active_only" = Option<bool>, Query, description = "Only active versions")),
    responses((status = 200, description = "Templates", body = [NotificationTemplate]))
)]
pub async fn list_templates(
    State(state): State<AppState>,
    Query(params): Query<ListTemplatesQuery>,
) -> Result<Json<ApiResponse<Vec<NotificationTemplate>>>> {
    let templates = state
        .templates
        .list(params.active_only.unwrap_or(true))
        .await?;
    Ok(Json(ApiResponse::success(templates)))
}

/// Get a template by name; latest active unless a version is pinned
/// GET /api/v1/admin/templates/{name}
#[utoipa::path(
    get,
    path = "/api/v1/admin/templates/{name}",
    tag = "templates",
    params(
        ("name" = String, Path, description = "Template name"),
        ("version" = Option<i32>, Query, description = "Explicit version to fetch")
    ),
    responses(
        (status = 200, description = "Template", body = NotificationTemplate),
        (status = 404, description = "Template not found")
    )
)]
pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<TemplateVersionQuery>,
) -> Result<Json<ApiResponse<NotificationTemplate>>> {
    let template = match params.version {
        Some(version) => state.templates.find_version(&name, version).await?,
        None => state.templates.find_active(&name).await?,
    }
    .ok_or_else(|| ApiError::not_found("Template"))?;
    Ok(Json(ApiResponse::success(template)))
}
