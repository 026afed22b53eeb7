//! Notification Models
//!
//! Data structures for the notification delivery system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::ParseEnumError;

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// Stored and streamed to the user's open sessions
    InApp,
    Email,
    Sms,
    Push,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::InApp => "in-app",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Push => "push",
            ChannelKind::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-app" | "in_app" => Ok(ChannelKind::InApp),
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            "push" => Ok(ChannelKind::Push),
            "webhook" => Ok(ChannelKind::Webhook),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Notification priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    /// Urgent notifications bypass quiet hours
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationPriority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(NotificationPriority::Low),
            "normal" => Ok(NotificationPriority::Normal),
            "high" => Ok(NotificationPriority::High),
            "urgent" => Ok(NotificationPriority::Urgent),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Lifecycle status of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Created but not yet attempted, or scheduled for the future
    #[default]
    Pending,
    /// Adapter accepted the message; delivery confirmation not immediate
    Sent,
    /// Confirmed delivered (always immediate for in-app)
    Delivered,
    /// Adapter reported an unrecoverable error
    Failed,
    /// Acknowledged by the user; independent of delivery success
    Read,
    /// Terminal; set by the expiry sweep or explicit user action
    Archived,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Read => "read",
            NotificationStatus::Archived => "archived",
        }
    }

    /// Whether `next` is a legal forward transition from this status.
    ///
    /// pending -> {sent, delivered, failed}; sent -> delivered;
    /// {sent, delivered, failed} -> read; any non-archived -> archived.
    /// No transition moves backward.
    pub fn can_transition_to(self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        match (self, next) {
            (Pending, Sent) | (Pending, Delivered) | (Pending, Failed) => true,
            (Sent, Delivered) => true,
            (Sent, Read) | (Delivered, Read) | (Failed, Read) => true,
            (from, Archived) if from != Archived => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "delivered" => Ok(NotificationStatus::Delivered),
            "failed" => Ok(NotificationStatus::Failed),
            "read" => Ok(NotificationStatus::Read),
            "archived" => Ok(NotificationStatus::Archived),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Call-to-action attached to a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationAction {
    pub name: String,
    pub text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// A notification record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub category: String,
    pub title: String,
    pub message: String,
    /// Structured payload; channel-specific sub-payloads live under the
    /// channel name key so scheduled dispatch can rebuild content
    pub data: serde_json::Value,
    pub priority: NotificationPriority,
    pub channel: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    pub actions: Vec<NotificationAction>,
    pub status: NotificationStatus,
    pub scheduled_for: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub is_active: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Transition to `next`, updating delivery bookkeeping fields.
    /// Returns false (and leaves the record untouched) for an illegal move.
    pub fn transition(&mut self, next: NotificationStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        match next {
            NotificationStatus::Delivered => self.delivered_at = Some(now),
            NotificationStatus::Read => self.read_at = Some(now),
            NotificationStatus::Archived => self.is_active = false,
            _ => {}
        }
        true
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Request to create and send a notification
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "notification type is required"))]
    pub notification_type: String,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    /// Literal title; required when no template is given
    pub title: Option<String>,
    /// Literal message; required when no template is given
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub priority: Option<NotificationPriority>,
    /// Defaults to in-app
    pub channel: Option<ChannelKind>,
    pub template_name: Option<String>,
    /// Variables fed to the template renderer
    pub template_data: Option<serde_json::Value>,
    pub actions: Option<Vec<NotificationAction>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Originating subsystem, recorded under metadata.source
    pub source: Option<String>,
}

/// Request payload for batch sends
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchSendRequest {
    #[validate(length(min = 1, message = "at least one notification is required"))]
    pub notifications: Vec<CreateNotificationRequest>,
}

/// Query params for listing notifications
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct ListNotificationsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub unread_only: Option<bool>,
    pub status: Option<NotificationStatus>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub channel: Option<ChannelKind>,
}

/// Response for listing notifications
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub total: i64,
}
