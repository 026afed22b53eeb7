//! Notification template models
//!
//! Templates are versioned, named content generators. Title/message (and
//! per-channel overrides) carry `{{variable}}` placeholders substituted at
//! render time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::notification::{NotificationAction, NotificationPriority};

/// Declared template variable
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Used when the caller does not supply the variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

/// Email-specific template content
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EmailTemplateContent {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_template: Option<String>,
}

/// SMS-specific template content
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SmsTemplateContent {
    pub text_template: String,
}

/// Push-specific template content
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PushTemplateContent {
    pub title_template: String,
    pub body_template: String,
}

/// Per-channel content overrides. A channel without an override falls back
/// to the rendered title/message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TemplateChannelContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailTemplateContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms: Option<SmsTemplateContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushTemplateContent>,
    /// Webhook payload shape; string leaves are substituted recursively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<serde_json::Value>,
}

/// A versioned notification template record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationTemplate {
    pub id: Uuid,
    /// Unique within a version chain
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub notification_type: String,
    pub category: String,
    pub title_template: String,
    pub message_template: String,
    pub default_priority: NotificationPriority,
    #[serde(default)]
    pub channels: TemplateChannelContent,
    /// Default actions; URLs may carry placeholders
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    pub is_active: bool,
    pub version: i32,
    /// Version number this record superseded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a template (or a new version of an existing name)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, message = "template name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "display name is required"))]
    pub display_name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "notification type is required"))]
    pub notification_type: String,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    #[validate(length(min = 1, message = "title template is required"))]
    pub title_template: String,
    #[validate(length(min = 1, message = "message template is required"))]
    pub message_template: String,
    pub default_priority: Option<NotificationPriority>,
    pub channels: Option<TemplateChannelContent>,
    pub actions: Option<Vec<NotificationAction>>,
    pub variables: Option<Vec<TemplateVariable>>,
}

/// Query params for fetching a template
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TemplateVersionQuery {
    /// Pin an explicit version; latest active otherwise
    pub version: Option<i32>,
}
