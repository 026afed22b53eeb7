//! Notification orchestrator
//!
//! The top-level coordinator: builds notification content (template or
//! literal fields), consults the preference evaluator, persists the
//! record, dispatches through the channel registry and updates lifecycle
//! state. Also owns batch send and the scheduled/expired sweeps, plus the
//! user-facing read/archive/delete surface consumed by the handlers.

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::database::repository::Pagination;
use crate::database::store::{
    NotificationFilter, NotificationStore, PreferenceStore, TemplateStore,
};
use crate::error::ApiError;
use crate::models::notification::{
    ChannelKind, CreateNotificationRequest, ListNotificationsQuery, Notification,
    NotificationListResponse, NotificationStatus,
};
use crate::models::preference::DeliverySettings;

use super::channels::DeliveryOutcome;
use super::preferences::{self, PreferenceDecision, PreferenceQuery};
use super::registry::ChannelRegistry;
use super::template::{self, RenderedContent};

/// Outcome of one create-and-send call
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SendResult {
    /// Dispatched; delivery confirmation tracked on the record
    Sent { notification: Notification },
    /// Accepted but intentionally held back (e.g. digest email)
    Queued { notification: Notification },
    /// Persisted pending; the scheduled sweep will dispatch it
    Scheduled { notification: Notification },
    /// Dispatch failed terminally; the record carries the error
    Failed { notification: Notification },
    /// Suppressed by preferences; nothing was persisted
    Skipped { reason: String },
}

impl SendResult {
    pub fn status_label(&self) -> &'static str {
        match self {
            SendResult::Sent { .. } => "sent",
            SendResult::Queued { .. } => "queued",
            SendResult::Scheduled { .. } => "scheduled",
            SendResult::Failed { .. } => "failed",
            SendResult::Skipped { .. } => "skipped",
        }
    }

    pub fn notification(&self) -> Option<&Notification> {
        match self {
            SendResult::Sent { notification }
            | SendResult::Queued { notification }
            | SendResult::Scheduled { notification }
            | SendResult::Failed { notification } => Some(notification),
            SendResult::Skipped { .. } => None,
        }
    }
}

/// Per-item detail for a batch send
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResult {
    pub index: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate batch-send outcome; one bad record never aborts the batch
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSendResult {
    pub total: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BatchItemResult>,
}

/// Result of one sweep invocation
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationOrchestrator {
    notifications: Arc<dyn NotificationStore>,
    templates: Arc<dyn TemplateStore>,
    preferences: Arc<dyn PreferenceStore>,
    registry: Arc<ChannelRegistry>,
}

impl NotificationOrchestrator {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        templates: Arc<dyn TemplateStore>,
        preferences: Arc<dyn PreferenceStore>,
        registry: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            notifications,
            templates,
            preferences,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Create a notification and dispatch it (unless scheduled for the
    /// future or suppressed by preferences).
    pub async fn create_and_send(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<SendResult, ApiError> {
        request.validate()?;
        if request.user_id.is_nil() {
            return Err(ApiError::validation_field("user_id", "recipient is required"));
        }

        let now = Utc::now();
        let channel = request.channel.unwrap_or(ChannelKind::InApp);

        // Build content from the template or from literal fields
        let mut content = match &request.template_name {
            Some(name) => {
                let template = self
                    .templates
                    .find_active(name)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Template"))?;
                let variables = request
                    .template_data
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({}));
                let validation = template::validate_variables(&template, &variables);
                if !validation.valid {
                    // lenient by design: render what we can, log the rest
                    warn!(
                        template = %name,
                        errors = ?validation.errors,
                        "rendering template with missing required variables"
                    );
                }
                template::render(&template, &variables, channel)
            }
            None => {
                let (Some(title), Some(message)) = (&request.title, &request.message) else {
                    return Err(ApiError::validation_field(
                        "title",
                        "title and message are required when no template is given",
                    ));
                };
                RenderedContent::literal(
                    title,
                    message,
                    request.actions.clone().unwrap_or_default(),
                    &request.notification_type,
                    &request.category,
                    request.priority.unwrap_or_default(),
                    channel,
                )
            }
        };
        // the caller's type/category name the event, template or not
        content.notification_type = request.notification_type.clone();
        content.category = request.category.clone();
        if let Some(actions) = &request.actions {
            content.actions = actions.clone();
        }

        // Preference-evaluation failures are logged and treated as allow
        let preference = match self.preferences.find(request.user_id).await {
            Ok(pref) => pref,
            Err(e) => {
                error!(user_id = %request.user_id, error = %e, "preference lookup failed, failing open");
                None
            }
        };

        let query = PreferenceQuery {
            category: &request.category,
            notification_type: &request.notification_type,
            channel,
            priority: content.priority,
            template_name: request.template_name.as_deref(),
        };
        // request priority wins, then a scoped preference override
        let priority = request
            .priority
            .or_else(|| preferences::priority_override(preference.as_ref(), &query))
            .unwrap_or(content.priority);
        content.priority = priority;
        let query = PreferenceQuery {
            priority,
            ..query
        };

        if let PreferenceDecision::Deny(reason) = preferences::evaluate(preference.as_ref(), &query, now)
        {
            info!(
                user_id = %request.user_id,
                channel = %channel,
                reason = %reason,
                "notification suppressed by preferences"
            );
            counter!("notifications_skipped_total", "channel" => channel.as_str()).increment(1);
            return Ok(SendResult::Skipped { reason });
        }

        // Persist the record with pending status before dispatch
        let mut data = request
            .data
            .clone()
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({}));
        if let Some(payload) = content.channel_payload(channel) {
            data[channel.as_str()] = payload;
        }
        let mut metadata = serde_json::json!({});
        if let Some(source) = &request.source {
            metadata["source"] = serde_json::Value::String(source.clone());
        }

        let scheduled_for = request.scheduled_for.unwrap_or(now);
        let mut notification = Notification {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            notification_type: request.notification_type.clone(),
            category: request.category.clone(),
            title: content.title.clone(),
            message: content.message.clone(),
            data,
            priority,
            channel,
            template_name: request.template_name.clone(),
            actions: content.actions.clone(),
            status: NotificationStatus::Pending,
            scheduled_for,
            expires_at: request.expires_at,
            delivered_at: None,
            read_at: None,
            error_message: None,
            is_active: true,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.notifications.insert(&notification).await?;

        if scheduled_for > now {
            info!(
                notification_id = %notification.id,
                scheduled_for = %scheduled_for,
                "notification scheduled for later dispatch"
            );
            return Ok(SendResult::Scheduled { notification });
        }

        let settings = DeliverySettings::from_preference(preference.as_ref());
        let outcome = self
            .registry
            .dispatch(&notification, &content, &settings, None)
            .await;
        self.apply_outcome(&mut notification, outcome).await
    }

    /// Re-dispatch a persisted pending notification (scheduled sweep path)
    async fn dispatch_stored(&self, mut notification: Notification) -> Result<SendResult, ApiError> {
        let preference = match self.preferences.find(notification.user_id).await {
            Ok(pref) => pref,
            Err(e) => {
                error!(user_id = %notification.user_id, error = %e, "preference lookup failed, failing open");
                None
            }
        };
        let settings = DeliverySettings::from_preference(preference.as_ref());
        let content = RenderedContent::from_notification(&notification);
        let outcome = self
            .registry
            .dispatch(&notification, &content, &settings, None)
            .await;
        self.apply_outcome(&mut notification, outcome).await
    }

    /// Fold a delivery outcome into the record and persist it
    async fn apply_outcome(
        &self,
        notification: &mut Notification,
        outcome: DeliveryOutcome,
    ) -> Result<SendResult, ApiError> {
        let now = Utc::now();
        let channel = notification.channel.as_str();

        if outcome.queued {
            counter!("notifications_queued_total", "channel" => channel).increment(1);
            return Ok(SendResult::Queued {
                notification: notification.clone(),
            });
        }

        if outcome.success {
            notification.transition(NotificationStatus::Sent, now);
            if outcome.delivered {
                notification.transition(NotificationStatus::Delivered, now);
            }
            self.notifications.update(notification).await?;
            counter!("notifications_sent_total", "channel" => channel).increment(1);
            info!(
                notification_id = %notification.id,
                channel = %notification.channel,
                message_id = outcome.message_id.as_deref().unwrap_or(""),
                "notification dispatched"
            );
            Ok(SendResult::Sent {
                notification: notification.clone(),
            })
        } else {
            notification.error_message = outcome.error.clone();
            notification.transition(NotificationStatus::Failed, now);
            self.notifications.update(notification).await?;
            counter!("notifications_failed_total", "channel" => channel).increment(1);
            warn!(
                notification_id = %notification.id,
                channel = %notification.channel,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "notification delivery failed"
            );
            Ok(SendResult::Failed {
                notification: notification.clone(),
            })
        }
    }

    /// Send a batch sequentially, isolating per-item failures
    pub async fn send_batch(&self, requests: Vec<CreateNotificationRequest>) -> BatchSendResult {
        let total = requests.len();
        let mut result = BatchSendResult {
            total,
            sent: 0,
            skipped: 0,
            failed: 0,
            items: Vec::with_capacity(total),
        };

        for (index, request) in requests.into_iter().enumerate() {
            match self.create_and_send(request).await {
                Ok(send_result) => {
                    match &send_result {
                        SendResult::Sent { .. }
                        | SendResult::Queued { .. }
                        | SendResult::Scheduled { .. } => result.sent += 1,
                        SendResult::Skipped { .. } => result.skipped += 1,
                        SendResult::Failed { .. } => result.failed += 1,
                    }
                    result.items.push(BatchItemResult {
                        index,
                        status: send_result.status_label().to_string(),
                        notification_id: send_result.notification().map(|n| n.id),
                        reason: match &send_result {
                            SendResult::Skipped { reason } => Some(reason.clone()),
                            SendResult::Failed { notification } => {
                                notification.error_message.clone()
                            }
                            _ => None,
                        },
                    });
                }
                Err(e) => {
                    result.failed += 1;
                    result.items.push(BatchItemResult {
                        index,
                        status: "failed".to_string(),
                        notification_id: None,
                        reason: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            total = result.total,
            sent = result.sent,
            skipped = result.skipped,
            failed = result.failed,
            "batch send completed"
        );
        result
    }

    /// Dispatch pending notifications whose scheduled time has elapsed.
    /// Each item runs on its own task so one endpoint's backoff cannot
    /// stall the sweep.
    pub async fn process_scheduled(&self, limit: i64) -> Result<SweepReport, ApiError> {
        let now = Utc::now();
        let due = self.notifications.due_scheduled(now, limit).await?;
        let mut report = SweepReport {
            processed: due.len(),
            ..Default::default()
        };

        let mut handles = Vec::with_capacity(due.len());
        for notification in due {
            let orchestrator = self.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.dispatch_stored(notification).await
            }));
        }
        for handle in handles {
            match handle.await {
                Ok(Ok(SendResult::Failed { .. })) | Ok(Err(_)) | Err(_) => report.failed += 1,
                Ok(Ok(_)) => report.succeeded += 1,
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                "scheduled notification sweep completed"
            );
        }
        Ok(report)
    }

    /// Archive notifications past their expiry time
    pub async fn process_expired(&self, limit: i64) -> Result<SweepReport, ApiError> {
        let now = Utc::now();
        let expired = self.notifications.expired(now, limit).await?;
        let mut report = SweepReport {
            processed: expired.len(),
            ..Default::default()
        };

        for mut notification in expired {
            notification.transition(NotificationStatus::Archived, now);
            match self.notifications.update(&notification).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(notification_id = %notification.id, error = %e, "failed to archive");
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                archived = report.succeeded,
                failed = report.failed,
                "expired notification sweep completed"
            );
        }
        Ok(report)
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<Notification, ApiError> {
        self.notifications
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Notification"))
    }

    pub async fn list_user_notifications(
        &self,
        user_id: Uuid,
        query: &ListNotificationsQuery,
    ) -> Result<NotificationListResponse, ApiError> {
        let filter = NotificationFilter::from(query);
        let pagination = Pagination::from_limit_offset(query.limit, query.offset);
        let page = self
            .notifications
            .list_for_user(user_id, &filter, &pagination)
            .await?;
        let unread_count = self.notifications.count_unread(user_id).await?;
        Ok(NotificationListResponse {
            notifications: page.items,
            unread_count,
            total: page.total,
        })
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification, ApiError> {
        let mut notification = self.owned_notification(id, user_id).await?;
        if notification.status == NotificationStatus::Read {
            return Ok(notification);
        }
        if !notification.transition(NotificationStatus::Read, Utc::now()) {
            return Err(ApiError::Conflict(format!(
                "cannot mark a {} notification as read",
                notification.status
            )));
        }
        self.notifications.update(&notification).await?;
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, ApiError> {
        self.notifications.mark_all_read(user_id, Utc::now()).await
    }

    pub async fn count_unread(&self, user_id: Uuid) -> Result<i64, ApiError> {
        self.notifications.count_unread(user_id).await
    }

    pub async fn archive(&self, id: Uuid, user_id: Uuid) -> Result<Notification, ApiError> {
        let mut notification = self.owned_notification(id, user_id).await?;
        if notification.status == NotificationStatus::Archived {
            return Ok(notification);
        }
        notification.transition(NotificationStatus::Archived, Utc::now());
        self.notifications.update(&notification).await?;
        Ok(notification)
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        if !self.notifications.delete(id, user_id).await? {
            return Err(ApiError::not_found("Notification"));
        }
        Ok(())
    }

    async fn owned_notification(&self, id: Uuid, user_id: Uuid) -> Result<Notification, ApiError> {
        let notification = self.get_notification(id).await?;
        if notification.user_id != user_id {
            return Err(ApiError::not_found("Notification"));
        }
        Ok(notification)
    }
}
