//! PostgreSQL store implementations.
//!
//! Structured fields (payloads, actions, template content, preference
//! documents) live in JSONB columns; enums are stored as text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, QueryBuilder, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::channel::{ChannelConfig, ChannelStats, ChannelStatus, ChannelType, DEFAULT_TAG};
use crate::models::notification::{
    ChannelKind, Notification, NotificationPriority, NotificationStatus,
};
use crate::models::preference::NotificationPreference;
use crate::models::template::NotificationTemplate;
use crate::models::ParseEnumError;

use super::repository::{PagedResult, Pagination};
use super::store::{
    ChannelStore, NotificationFilter, NotificationStore, PreferenceStore, TemplateStore,
};

fn decode_json<T: DeserializeOwned>(row: &PgRow, column: &str) -> Result<T, sqlx::Error> {
    let value: serde_json::Value = row.try_get(column)?;
    serde_json::from_value(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: ParseEnumError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, PgRow> for Notification {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            notification_type: row.try_get("notification_type")?,
            category: row.try_get("category")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            data: row.try_get("data")?,
            priority: decode_enum::<NotificationPriority>(row, "priority")?,
            channel: decode_enum::<ChannelKind>(row, "channel")?,
            template_name: row.try_get("template_name")?,
            actions: decode_json(row, "actions")?,
            status: decode_enum::<NotificationStatus>(row, "status")?,
            scheduled_for: row.try_get("scheduled_for")?,
            expires_at: row.try_get("expires_at")?,
            delivered_at: row.try_get("delivered_at")?,
            read_at: row.try_get("read_at")?,
            error_message: row.try_get("error_message")?,
            is_active: row.try_get("is_active")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for NotificationTemplate {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            description: row.try_get("description")?,
            notification_type: row.try_get("notification_type")?,
            category: row.try_get("category")?,
            title_template: row.try_get("title_template")?,
            message_template: row.try_get("message_template")?,
            default_priority: decode_enum::<NotificationPriority>(row, "default_priority")?,
            channels: decode_json(row, "channels")?,
            actions: decode_json(row, "actions")?,
            variables: decode_json(row, "variables")?,
            is_active: row.try_get("is_active")?,
            version: row.try_get("version")?,
            previous_version: row.try_get("previous_version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for ChannelConfig {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            channel_type: decode_enum::<ChannelType>(row, "channel_type")?,
            provider: row.try_get("provider")?,
            config: row.try_get("config")?,
            status: decode_enum::<ChannelStatus>(row, "status")?,
            error_message: row.try_get("error_message")?,
            tags: row.try_get("tags")?,
            stats: ChannelStats {
                sent: row.try_get("stats_sent")?,
                delivered: row.try_get("stats_delivered")?,
                failed: row.try_get("stats_failed")?,
                last_sent_at: row.try_get("last_sent_at")?,
            },
            last_tested_at: row.try_get("last_tested_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, notification_type, category, title, message, \
     data, priority, channel, template_name, actions, status, scheduled_for, expires_at, \
     delivered_at, read_at, error_message, is_active, metadata, created_at, updated_at";

const CHANNEL_COLUMNS: &str = "id, name, display_name, channel_type, provider, config, status, \
     error_message, tags, stats_sent, stats_delivered, stats_failed, last_sent_at, \
     last_tested_at, created_at, updated_at";

const TEMPLATE_COLUMNS: &str = "id, name, display_name, description, notification_type, \
     category, title_template, message_template, default_priority, channels, actions, \
     variables, is_active, version, previous_version, created_at, updated_at";

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &NotificationFilter) {
        if filter.unread_only {
            builder.push(" AND read_at IS NULL");
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = &filter.category {
            builder
                .push(" AND category = ")
                .push_bind(category.clone());
        }
        if let Some(t) = &filter.notification_type {
            builder
                .push(" AND notification_type = ")
                .push_bind(t.clone());
        }
        if let Some(channel) = filter.channel {
            builder.push(" AND channel = ").push_bind(channel.as_str());
        }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, n: &Notification) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, notification_type, category, title, \
             message, data, priority, channel, template_name, actions, status, scheduled_for, \
             expires_at, delivered_at, read_at, error_message, is_active, metadata, created_at, \
             updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21)",
        )
        .bind(n.id)
        .bind(n.user_id)
        .bind(&n.notification_type)
        .bind(&n.category)
        .bind(&n.title)
        .bind(&n.message)
        .bind(&n.data)
        .bind(n.priority.as_str())
        .bind(n.channel.as_str())
        .bind(&n.template_name)
        .bind(serde_json::to_value(&n.actions).unwrap_or_default())
        .bind(n.status.as_str())
        .bind(n.scheduled_for)
        .bind(n.expires_at)
        .bind(n.delivered_at)
        .bind(n.read_at)
        .bind(&n.error_message)
        .bind(n.is_active)
        .bind(&n.metadata)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, ApiError> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn update(&self, n: &Notification) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = $2, data = $3, delivered_at = $4, read_at = $5, \
             error_message = $6, is_active = $7, metadata = $8, scheduled_for = $9, \
             updated_at = $10 WHERE id = $1",
        )
        .bind(n.id)
        .bind(n.status.as_str())
        .bind(&n.data)
        .bind(n.delivered_at)
        .bind(n.read_at)
        .bind(&n.error_message)
        .bind(n.is_active)
        .bind(&n.metadata)
        .bind(n.scheduled_for)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Notification"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationFilter,
        pagination: &Pagination,
    ) -> Result<PagedResult<Notification>, ApiError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE is_active AND user_id = "
        ));
        builder.push_bind(user_id);
        Self::push_filters(&mut builder, filter);
        builder
            .push(" ORDER BY created_at ")
            .push(pagination.sort_order.as_str())
            .push(" LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let items = builder
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_builder =
            QueryBuilder::new("SELECT COUNT(*) FROM notifications WHERE is_active AND user_id = ");
        count_builder.push_bind(user_id);
        Self::push_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(PagedResult::new(items, total))
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'read', read_at = $2, updated_at = $2 \
             WHERE user_id = $1 AND read_at IS NULL \
             AND status IN ('sent', 'delivered', 'failed')",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, ApiError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id = $1 AND is_active AND read_at IS NULL AND status <> 'archived'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, ApiError> {
        let due = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE status = 'pending' AND is_active AND scheduled_for <= $1 \
             ORDER BY scheduled_for ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(due)
    }

    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Notification>, ApiError> {
        let expired = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE status <> 'archived' AND expires_at IS NOT NULL AND expires_at <= $1 \
             ORDER BY expires_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(expired)
    }
}

pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn insert(&self, t: &NotificationTemplate) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO notification_templates (id, name, display_name, description, \
             notification_type, category, title_template, message_template, default_priority, \
             channels, actions, variables, is_active, version, previous_version, created_at, \
             updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(&t.display_name)
        .bind(&t.description)
        .bind(&t.notification_type)
        .bind(&t.category)
        .bind(&t.title_template)
        .bind(&t.message_template)
        .bind(t.default_priority.as_str())
        .bind(serde_json::to_value(&t.channels).unwrap_or_default())
        .bind(serde_json::to_value(&t.actions).unwrap_or_default())
        .bind(serde_json::to_value(&t.variables).unwrap_or_default())
        .bind(t.is_active)
        .bind(t.version)
        .bind(t.previous_version)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::already_exists("Template version")
            }
            _ => ApiError::Database(e),
        })?;
        Ok(())
    }

    async fn find_active(&self, name: &str) -> Result<Option<NotificationTemplate>, ApiError> {
        let template = sqlx::query_as::<_, NotificationTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM notification_templates \
             WHERE name = $1 AND is_active ORDER BY version DESC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn find_version(
        &self,
        name: &str,
        version: i32,
    ) -> Result<Option<NotificationTemplate>, ApiError> {
        let template = sqlx::query_as::<_, NotificationTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM notification_templates \
             WHERE name = $1 AND version = $2"
        ))
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn latest_version(&self, name: &str) -> Result<Option<NotificationTemplate>, ApiError> {
        let template = sqlx::query_as::<_, NotificationTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM notification_templates \
             WHERE name = $1 ORDER BY version DESC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE notification_templates SET is_active = false, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<NotificationTemplate>, ApiError> {
        let sql = if active_only {
            format!(
                "SELECT {TEMPLATE_COLUMNS} FROM notification_templates WHERE is_active \
                 ORDER BY name, version DESC"
            )
        } else {
            format!(
                "SELECT {TEMPLATE_COLUMNS} FROM notification_templates ORDER BY name, version DESC"
            )
        };
        let templates = sqlx::query_as::<_, NotificationTemplate>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(templates)
    }
}

pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<NotificationPreference>, ApiError> {
        let document: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT document FROM notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match document {
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| ApiError::Internal(format!("corrupt preference document: {}", e))),
            None => Ok(None),
        }
    }

    async fn upsert(&self, preference: &NotificationPreference) -> Result<(), ApiError> {
        let document = serde_json::to_value(preference)
            .map_err(|e| ApiError::Internal(format!("failed to encode preferences: {}", e)))?;
        sqlx::query(
            "INSERT INTO notification_preferences (user_id, document, created_at, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET document = $2, updated_at = $4",
        )
        .bind(preference.user_id)
        .bind(document)
        .bind(preference.created_at)
        .bind(preference.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM notification_preferences WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct PgChannelStore {
    pool: PgPool,
}

impl PgChannelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for PgChannelStore {
    async fn insert(&self, c: &ChannelConfig) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO notification_channels (id, name, display_name, channel_type, provider, \
             config, status, error_message, tags, stats_sent, stats_delivered, stats_failed, \
             last_sent_at, last_tested_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.display_name)
        .bind(c.channel_type.as_str())
        .bind(&c.provider)
        .bind(&c.config)
        .bind(c.status.as_str())
        .bind(&c.error_message)
        .bind(&c.tags)
        .bind(c.stats.sent)
        .bind(c.stats.delivered)
        .bind(c.stats.failed)
        .bind(c.stats.last_sent_at)
        .bind(c.last_tested_at)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::already_exists("Channel")
            }
            _ => ApiError::Database(e),
        })?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ChannelConfig>, ApiError> {
        let channel = sqlx::query_as::<_, ChannelConfig>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(channel)
    }

    async fn list(&self) -> Result<Vec<ChannelConfig>, ApiError> {
        let channels = sqlx::query_as::<_, ChannelConfig>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM notification_channels ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn list_active_by_type(
        &self,
        channel_type: ChannelType,
    ) -> Result<Vec<ChannelConfig>, ApiError> {
        let channels = sqlx::query_as::<_, ChannelConfig>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM notification_channels \
             WHERE channel_type = $1 AND status = 'active' ORDER BY name"
        ))
        .bind(channel_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn update(&self, c: &ChannelConfig) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE notification_channels SET display_name = $2, provider = $3, config = $4, \
             status = $5, error_message = $6, tags = $7, updated_at = $8 WHERE name = $1",
        )
        .bind(&c.name)
        .bind(&c.display_name)
        .bind(&c.provider)
        .bind(&c.config)
        .bind(c.status.as_str())
        .bind(&c.error_message)
        .bind(&c.tags)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Channel"));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM notification_channels WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_default(
        &self,
        channel_type: ChannelType,
        name: &str,
    ) -> Result<ChannelConfig, ApiError> {
        let mut tx = self.pool.begin().await?;

        // Clear the tag from every same-type channel before setting it,
        // so at most one default exists per type at any time
        sqlx::query(
            "UPDATE notification_channels \
             SET tags = array_remove(tags, $2), updated_at = NOW() \
             WHERE channel_type = $1",
        )
        .bind(channel_type.as_str())
        .bind(DEFAULT_TAG)
        .execute(&mut *tx)
        .await?;

        let channel = sqlx::query_as::<_, ChannelConfig>(&format!(
            "UPDATE notification_channels \
             SET tags = array_append(tags, $2), updated_at = NOW() \
             WHERE name = $1 RETURNING {CHANNEL_COLUMNS}"
        ))
        .bind(name)
        .bind(DEFAULT_TAG)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel"))?;

        tx.commit().await?;
        Ok(channel)
    }

    async fn record_attempt(
        &self,
        name: &str,
        success: bool,
        delivered: bool,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE notification_channels SET \
             stats_sent = stats_sent + CASE WHEN $2 THEN 1 ELSE 0 END, \
             stats_delivered = stats_delivered + CASE WHEN $3 THEN 1 ELSE 0 END, \
             stats_failed = stats_failed + CASE WHEN $2 THEN 0 ELSE 1 END, \
             last_sent_at = $4, updated_at = $4 \
             WHERE name = $1",
        )
        .bind(name)
        .bind(success)
        .bind(success && delivered)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        name: &str,
        status: ChannelStatus,
        error_message: Option<String>,
        tested_at: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE notification_channels SET status = $2, error_message = $3, \
             last_tested_at = COALESCE($4, last_tested_at), updated_at = NOW() \
             WHERE name = $1",
        )
        .bind(name)
        .bind(status.as_str())
        .bind(error_message)
        .bind(tested_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Channel"));
        }
        Ok(())
    }
}
