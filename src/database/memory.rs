//! In-memory store implementations.
//!
//! Used by the integration tests and for local development without a
//! database. Semantics mirror the Postgres implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::channel::{ChannelConfig, ChannelStatus, ChannelType, DEFAULT_TAG};
use crate::models::notification::{Notification, NotificationStatus};
use crate::models::preference::NotificationPreference;
use crate::models::template::NotificationTemplate;

use super::repository::{PagedResult, Pagination};
use super::store::{
    ChannelStore, NotificationFilter, NotificationStore, PreferenceStore, TemplateStore,
};

#[derive(Default)]
pub struct InMemoryNotificationStore {
    rows: RwLock<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<(), ApiError> {
        self.rows
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, ApiError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn update(&self, notification: &Notification) -> Result<(), ApiError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&notification.id) {
            return Err(ApiError::not_found("Notification"));
        }
        rows.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
        let mut rows = self.rows.write().await;
        match rows.get(&id) {
            Some(n) if n.user_id == user_id => {
                rows.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationFilter,
        pagination: &Pagination,
    ) -> Result<PagedResult<Notification>, ApiError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Notification> = rows
            .values()
            .filter(|n| n.user_id == user_id && n.is_active && filter.matches(n))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        Ok(PagedResult::new(items, total))
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, ApiError> {
        let mut rows = self.rows.write().await;
        let mut affected = 0u64;
        for n in rows.values_mut() {
            if n.user_id == user_id
                && n.read_at.is_none()
                && n.status.can_transition_to(NotificationStatus::Read)
            {
                n.transition(NotificationStatus::Read, at);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, ApiError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|n| {
                n.user_id == user_id
                    && n.is_active
                    && n.read_at.is_none()
                    && n.status != NotificationStatus::Archived
            })
            .count() as i64)
    }

    async fn due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, ApiError> {
        let rows = self.rows.read().await;
        let mut due: Vec<Notification> = rows
            .values()
            .filter(|n| {
                n.status == NotificationStatus::Pending && n.is_active && n.scheduled_for <= now
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Notification>, ApiError> {
        let rows = self.rows.read().await;
        let mut expired: Vec<Notification> = rows
            .values()
            .filter(|n| n.status != NotificationStatus::Archived && n.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }
}

#[derive(Default)]
pub struct InMemoryTemplateStore {
    rows: RwLock<Vec<NotificationTemplate>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn insert(&self, template: &NotificationTemplate) -> Result<(), ApiError> {
        self.rows.write().await.push(template.clone());
        Ok(())
    }

    async fn find_active(&self, name: &str) -> Result<Option<NotificationTemplate>, ApiError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|t| t.name == name && t.is_active)
            .max_by_key(|t| t.version)
            .cloned())
    }

    async fn find_version(
        &self,
        name: &str,
        version: i32,
    ) -> Result<Option<NotificationTemplate>, ApiError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|t| t.name == name && t.version == version)
            .cloned())
    }

    async fn latest_version(&self, name: &str) -> Result<Option<NotificationTemplate>, ApiError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|t| t.name == name)
            .max_by_key(|t| t.version)
            .cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), ApiError> {
        let mut rows = self.rows.write().await;
        for t in rows.iter_mut() {
            if t.id == id {
                t.is_active = false;
            }
        }
        Ok(())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<NotificationTemplate>, ApiError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    rows: RwLock<HashMap<Uuid, NotificationPreference>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<NotificationPreference>, ApiError> {
        Ok(self.rows.read().await.get(&user_id).cloned())
    }

    async fn upsert(&self, preference: &NotificationPreference) -> Result<(), ApiError> {
        self.rows
            .write()
            .await
            .insert(preference.user_id, preference.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool, ApiError> {
        Ok(self.rows.write().await.remove(&user_id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryChannelStore {
    rows: RwLock<HashMap<String, ChannelConfig>>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelStore for InMemoryChannelStore {
    async fn insert(&self, channel: &ChannelConfig) -> Result<(), ApiError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&channel.name) {
            return Err(ApiError::already_exists("Channel"));
        }
        rows.insert(channel.name.clone(), channel.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ChannelConfig>, ApiError> {
        Ok(self.rows.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<ChannelConfig>, ApiError> {
        let rows = self.rows.read().await;
        let mut channels: Vec<ChannelConfig> = rows.values().cloned().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    async fn list_active_by_type(
        &self,
        channel_type: ChannelType,
    ) -> Result<Vec<ChannelConfig>, ApiError> {
        let rows = self.rows.read().await;
        let mut channels: Vec<ChannelConfig> = rows
            .values()
            .filter(|c| c.channel_type == channel_type && c.status == ChannelStatus::Active)
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    async fn update(&self, channel: &ChannelConfig) -> Result<(), ApiError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&channel.name) {
            return Err(ApiError::not_found("Channel"));
        }
        rows.insert(channel.name.clone(), channel.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, ApiError> {
        Ok(self.rows.write().await.remove(name).is_some())
    }

    async fn set_default(
        &self,
        channel_type: ChannelType,
        name: &str,
    ) -> Result<ChannelConfig, ApiError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(name) {
            return Err(ApiError::not_found("Channel"));
        }
        for c in rows.values_mut() {
            if c.channel_type == channel_type {
                c.tags.retain(|t| t != DEFAULT_TAG);
            }
        }
        let channel = rows.get_mut(name).expect("checked above");
        channel.tags.push(DEFAULT_TAG.to_string());
        channel.updated_at = Utc::now();
        Ok(channel.clone())
    }

    async fn record_attempt(
        &self,
        name: &str,
        success: bool,
        delivered: bool,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let mut rows = self.rows.write().await;
        if let Some(c) = rows.get_mut(name) {
            if success {
                c.stats.sent += 1;
                if delivered {
                    c.stats.delivered += 1;
                }
            } else {
                c.stats.failed += 1;
            }
            c.stats.last_sent_at = Some(at);
            c.updated_at = at;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        name: &str,
        status: ChannelStatus,
        error_message: Option<String>,
        tested_at: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError> {
        let mut rows = self.rows.write().await;
        let channel = rows.get_mut(name).ok_or_else(|| ApiError::not_found("Channel"))?;
        channel.status = status;
        channel.error_message = error_message;
        if tested_at.is_some() {
            channel.last_tested_at = tested_at;
        }
        channel.updated_at = Utc::now();
        Ok(())
    }
}
