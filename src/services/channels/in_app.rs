//! In-app channel adapter
//!
//! The notification record itself is the delivery artifact, so delivery
//! is immediate by definition. Connected WebSocket sessions receive the
//! notification through a broadcast channel; an empty receiver set just
//! means nobody is connected.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::channel::ChannelConfig;
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::DeliverySettings;
use crate::services::template::RenderedContent;

use super::{ChannelAdapter, DeliveryError, DeliveryOutcome};

/// Message fanned out to WebSocket stream handlers
#[derive(Debug, Clone)]
pub struct InAppEvent {
    pub user_id: Uuid,
    pub notification: Notification,
}

pub struct InAppAdapter {
    events: broadcast::Sender<InAppEvent>,
}

impl InAppAdapter {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    /// Subscribe to the live in-app notification feed
    pub fn subscribe(&self) -> broadcast::Receiver<InAppEvent> {
        self.events.subscribe()
    }
}

impl Default for InAppAdapter {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl ChannelAdapter for InAppAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn initialize_channel(&self, _channel: &ChannelConfig) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send(
        &self,
        notification: &Notification,
        _content: &RenderedContent,
        _settings: &DeliverySettings,
        _channel: &ChannelConfig,
    ) -> DeliveryOutcome {
        let event = InAppEvent {
            user_id: notification.user_id,
            notification: notification.clone(),
        };
        if self.events.send(event).is_err() {
            // no receivers; the stored record still counts as delivered
            debug!(notification_id = %notification.id, "no live in-app subscribers");
        }
        DeliveryOutcome::delivered(notification.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{NotificationPriority, NotificationStatus};
    use chrono::Utc;

    fn sample_notification() -> Notification {
        let now = Utc::now();
        Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            notification_type: "order_shipped".to_string(),
            category: "orders".to_string(),
            title: "Order shipped".to_string(),
            message: "Your produce box is on the way".to_string(),
            data: serde_json::json!({}),
            priority: NotificationPriority::Normal,
            channel: ChannelKind::InApp,
            template_name: None,
            actions: vec![],
            status: NotificationStatus::Pending,
            scheduled_for: now,
            expires_at: None,
            delivered_at: None,
            read_at: None,
            error_message: None,
            is_active: true,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_in_app_delivers_immediately_and_broadcasts() {
        let adapter = InAppAdapter::new(16);
        let mut rx = adapter.subscribe();
        let notification = sample_notification();
        let channel = ChannelConfig::builtin_in_app(Utc::now());
        let content = RenderedContent::from_notification(&notification);

        let outcome = adapter
            .send(
                &notification,
                &content,
                &DeliverySettings::default(),
                &channel,
            )
            .await;

        assert!(outcome.success);
        assert!(outcome.delivered);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id, notification.user_id);
        assert_eq!(event.notification.id, notification.id);
    }

    #[tokio::test]
    async fn test_in_app_succeeds_without_subscribers() {
        let adapter = InAppAdapter::new(16);
        let notification = sample_notification();
        let channel = ChannelConfig::builtin_in_app(Utc::now());
        let content = RenderedContent::from_notification(&notification);

        let outcome = adapter
            .send(
                &notification,
                &content,
                &DeliverySettings::default(),
                &channel,
            )
            .await;
        assert!(outcome.success);
    }
}
