//! Record-store traits consumed by the orchestrator and registry.
//!
//! Persistence is a narrow seam: each trait has a Postgres implementation
//! (`postgres` module) and an in-memory implementation (`memory` module)
//! used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::channel::{ChannelConfig, ChannelStatus, ChannelType};
use crate::models::notification::{
    ChannelKind, ListNotificationsQuery, Notification, NotificationStatus,
};
use crate::models::preference::NotificationPreference;
use crate::models::template::NotificationTemplate;

use super::repository::{PagedResult, Pagination};

/// Filter for user-facing notification listings
#[derive(Debug, Default, Clone)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub status: Option<NotificationStatus>,
    pub category: Option<String>,
    pub notification_type: Option<String>,
    pub channel: Option<ChannelKind>,
}

impl From<&ListNotificationsQuery> for NotificationFilter {
    fn from(q: &ListNotificationsQuery) -> Self {
        Self {
            unread_only: q.unread_only.unwrap_or(false),
            status: q.status,
            category: q.category.clone(),
            notification_type: q.notification_type.clone(),
            channel: q.channel,
        }
    }
}

impl NotificationFilter {
    /// Whether a notification matches this filter (shared by the memory
    /// store; the Postgres store pushes the same conditions into SQL)
    pub fn matches(&self, n: &Notification) -> bool {
        if self.unread_only && n.read_at.is_some() {
            return false;
        }
        if let Some(status) = self.status {
            if n.status != status {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &n.category != category {
                return false;
            }
        }
        if let Some(t) = &self.notification_type {
            if &n.notification_type != t {
                return false;
            }
        }
        if let Some(channel) = self.channel {
            if n.channel != channel {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), ApiError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, ApiError>;

    async fn update(&self, notification: &Notification) -> Result<(), ApiError>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, ApiError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationFilter,
        pagination: &Pagination,
    ) -> Result<PagedResult<Notification>, ApiError>;

    /// Bulk mark-read; returns the number of affected rows
    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, ApiError>;

    /// Unread = active, never read, not archived
    async fn count_unread(&self, user_id: Uuid) -> Result<i64, ApiError>;

    /// Pending notifications whose scheduled_for has elapsed
    async fn due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, ApiError>;

    /// Notifications past expires_at that are not yet archived
    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Notification>, ApiError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert(&self, template: &NotificationTemplate) -> Result<(), ApiError>;

    /// Highest-version active template for the name
    async fn find_active(&self, name: &str) -> Result<Option<NotificationTemplate>, ApiError>;

    /// Explicitly pinned version, active or not
    async fn find_version(
        &self,
        name: &str,
        version: i32,
    ) -> Result<Option<NotificationTemplate>, ApiError>;

    /// Highest version for the name regardless of active flag
    async fn latest_version(&self, name: &str) -> Result<Option<NotificationTemplate>, ApiError>;

    async fn deactivate(&self, id: Uuid) -> Result<(), ApiError>;

    async fn list(&self, active_only: bool) -> Result<Vec<NotificationTemplate>, ApiError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn find(&self, user_id: Uuid) -> Result<Option<NotificationPreference>, ApiError>;

    async fn upsert(&self, preference: &NotificationPreference) -> Result<(), ApiError>;

    async fn delete(&self, user_id: Uuid) -> Result<bool, ApiError>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Fails with Conflict when the name is taken
    async fn insert(&self, channel: &ChannelConfig) -> Result<(), ApiError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ChannelConfig>, ApiError>;

    async fn list(&self) -> Result<Vec<ChannelConfig>, ApiError>;

    async fn list_active_by_type(
        &self,
        channel_type: ChannelType,
    ) -> Result<Vec<ChannelConfig>, ApiError>;

    async fn update(&self, channel: &ChannelConfig) -> Result<(), ApiError>;

    async fn delete(&self, name: &str) -> Result<bool, ApiError>;

    /// Clear the default tag from all channels of the type, then set it on
    /// the named channel. Enforces the one-default-per-type invariant.
    async fn set_default(
        &self,
        channel_type: ChannelType,
        name: &str,
    ) -> Result<ChannelConfig, ApiError>;

    /// Record a delivery attempt in the channel's cumulative statistics
    async fn record_attempt(
        &self,
        name: &str,
        success: bool,
        delivered: bool,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError>;

    /// Update operational status, error message and last-tested marker
    async fn set_status(
        &self,
        name: &str,
        status: ChannelStatus,
        error_message: Option<String>,
        tested_at: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError>;
}
