//! End-to-end orchestrator tests over the in-memory stores.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use notification_service::database::memory::{
    InMemoryChannelStore, InMemoryNotificationStore, InMemoryPreferenceStore,
    InMemoryTemplateStore,
};
use notification_service::database::store::{
    ChannelStore, NotificationStore, PreferenceStore, TemplateStore,
};
use notification_service::models::channel::{
    ChannelConfig, ChannelStats, ChannelStatus, ChannelType,
};
use notification_service::models::notification::{
    ChannelKind, CreateNotificationRequest, ListNotificationsQuery, NotificationAction,
    NotificationPriority, NotificationStatus,
};
use notification_service::models::preference::{
    ChannelPreferences, DeliveryFrequency, EmailSettings, NotificationPreference, ScopedOverride,
};
use notification_service::models::template::{
    CreateTemplateRequest, EmailTemplateContent, NotificationTemplate, TemplateChannelContent,
    TemplateVariable,
};
use notification_service::services::channels::{
    ChannelAdapter, DeliveryError, DeliveryOutcome, EmailAdapter, InAppAdapter,
};
use notification_service::services::orchestrator::{NotificationOrchestrator, SendResult};
use notification_service::services::registry::ChannelRegistry;
use notification_service::services::template::RenderedContent;
use notification_service::models::notification::Notification;
use notification_service::models::preference::DeliverySettings;

/// Email-channel adapter double with a scriptable outcome
struct MockEmailAdapter {
    outcome: DeliveryOutcome,
    sends: Mutex<Vec<Uuid>>,
}

impl MockEmailAdapter {
    fn sending(outcome: DeliveryOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            sends: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChannelAdapter for MockEmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
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
        self.sends.lock().await.push(notification.id);
        self.outcome.clone()
    }
}

struct Harness {
    notifications: Arc<InMemoryNotificationStore>,
    preferences: Arc<InMemoryPreferenceStore>,
    templates: Arc<InMemoryTemplateStore>,
    channels: Arc<InMemoryChannelStore>,
    orchestrator: NotificationOrchestrator,
}

fn email_channel(name: &str) -> ChannelConfig {
    let now = Utc::now();
    ChannelConfig {
        id: Uuid::new_v4(),
        name: name.to_string(),
        display_name: name.to_string(),
        channel_type: ChannelType::Email,
        provider: "smtp".to_string(),
        config: json!({
            "smtp_host": "localhost",
            "smtp_port": 1025,
            "from_name": "FarmLink",
            "from_address": "noreply@farmlink.example",
        }),
        status: ChannelStatus::Active,
        error_message: None,
        tags: vec![],
        stats: ChannelStats::default(),
        last_tested_at: None,
        created_at: now,
        updated_at: now,
    }
}

async fn harness(email_adapter: Arc<dyn ChannelAdapter>) -> Harness {
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let preferences = Arc::new(InMemoryPreferenceStore::new());
    let templates = Arc::new(InMemoryTemplateStore::new());
    let channels = Arc::new(InMemoryChannelStore::new());
    channels.insert(&email_channel("primary-email")).await.unwrap();

    let registry = Arc::new(
        ChannelRegistry::new(channels.clone() as Arc<dyn ChannelStore>)
            .with_adapter(Arc::new(InAppAdapter::new(16)))
            .with_adapter(email_adapter),
    );
    let orchestrator = NotificationOrchestrator::new(
        notifications.clone() as Arc<dyn NotificationStore>,
        templates.clone() as Arc<dyn TemplateStore>,
        preferences.clone() as Arc<dyn PreferenceStore>,
        registry,
    );

    Harness {
        notifications,
        preferences,
        templates,
        channels,
        orchestrator,
    }
}

fn in_app_request(user_id: Uuid) -> CreateNotificationRequest {
    CreateNotificationRequest {
        user_id,
        notification_type: "order_shipped".to_string(),
        category: "orders".to_string(),
        title: Some("Order shipped".to_string()),
        message: Some("Your produce box is on the way".to_string()),
        data: None,
        priority: None,
        channel: None,
        template_name: None,
        template_data: None,
        actions: None,
        scheduled_for: None,
        expires_at: None,
        source: Some("order-service".to_string()),
    }
}

fn email_request(user_id: Uuid) -> CreateNotificationRequest {
    CreateNotificationRequest {
        channel: Some(ChannelKind::Email),
        ..in_app_request(user_id)
    }
}

async fn preference_with_email(harness: &Harness, user_id: Uuid) -> NotificationPreference {
    let mut pref = NotificationPreference::defaults(user_id, Utc::now());
    pref.channels = ChannelPreferences {
        email: EmailSettings {
            enabled: true,
            address: Some("asha@example.com".to_string()),
            frequency: DeliveryFrequency::Immediate,
            digest_time: None,
        },
        ..Default::default()
    };
    harness.preferences.upsert(&pref).await.unwrap();
    pref
}

fn welcome_template() -> NotificationTemplate {
    let payload = CreateTemplateRequest {
        name: "welcome".to_string(),
        display_name: "Welcome".to_string(),
        description: None,
        notification_type: "account_created".to_string(),
        category: "account".to_string(),
        title_template: "Welcome to FarmLink, {{name}}!".to_string(),
        message_template: "Hi {{name}}, your market stall is ready.".to_string(),
        default_priority: Some(NotificationPriority::Normal),
        channels: Some(TemplateChannelContent {
            email: Some(EmailTemplateContent {
                subject: "Welcome aboard, {{name}}".to_string(),
                html_template: Some("<p>Hello {{name}}</p>".to_string()),
                text_template: None,
            }),
            ..Default::default()
        }),
        actions: Some(vec![NotificationAction {
            name: "open".to_string(),
            text: "Open dashboard".to_string(),
            url: "https://app.farmlink.example/u/{{name}}".to_string(),
            icon: None,
            primary: true,
        }]),
        variables: Some(vec![TemplateVariable {
            name: "name".to_string(),
            required: true,
            default_value: None,
            example: None,
        }]),
    };
    let now = Utc::now();
    NotificationTemplate {
        id: Uuid::new_v4(),
        name: payload.name,
        display_name: payload.display_name,
        description: payload.description,
        notification_type: payload.notification_type,
        category: payload.category,
        title_template: payload.title_template,
        message_template: payload.message_template,
        default_priority: payload.default_priority.unwrap(),
        channels: payload.channels.unwrap(),
        actions: payload.actions.unwrap(),
        variables: payload.variables.unwrap(),
        is_active: true,
        version: 1,
        previous_version: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn in_app_send_is_delivered_immediately() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let result = h.orchestrator.create_and_send(in_app_request(user_id)).await.unwrap();
    let SendResult::Sent { notification } = result else {
        panic!("expected sent result");
    };
    assert_eq!(notification.status, NotificationStatus::Delivered);
    assert!(notification.delivered_at.is_some());
    assert_eq!(notification.channel, ChannelKind::InApp);
    assert_eq!(notification.metadata["source"], "order-service");

    let stored = h
        .notifications
        .find_by_id(notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, NotificationStatus::Delivered);
}

#[tokio::test]
async fn template_render_populates_email_content() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("msg-1"))).await;
    let user_id = Uuid::new_v4();
    preference_with_email(&h, user_id).await;
    h.templates.insert(&welcome_template()).await.unwrap();

    let request = CreateNotificationRequest {
        notification_type: "account_created".to_string(),
        category: "account".to_string(),
        title: None,
        message: None,
        template_name: Some("welcome".to_string()),
        template_data: Some(json!({"name": "Asha"})),
        ..email_request(user_id)
    };
    let result = h.orchestrator.create_and_send(request).await.unwrap();
    let SendResult::Sent { notification } = result else {
        panic!("expected sent result");
    };

    assert!(notification.title.contains("Asha"));
    assert!(notification.message.contains("Asha"));
    assert_eq!(notification.status, NotificationStatus::Sent);
    assert_eq!(notification.data["email"]["subject"], "Welcome aboard, Asha");
    assert_eq!(notification.data["email"]["html_body"], "<p>Hello Asha</p>");
    assert_eq!(
        notification.actions[0].url,
        "https://app.farmlink.example/u/Asha"
    );

    // the explicit record-delivery step updated channel statistics
    let channel = h
        .channels
        .find_by_name("primary-email")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel.stats.sent, 1);
    assert_eq!(channel.stats.failed, 0);
    assert!(channel.stats.last_sent_at.is_some());
}

#[tokio::test]
async fn missing_template_is_not_found() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let request = CreateNotificationRequest {
        template_name: Some("ghost".to_string()),
        title: None,
        message: None,
        ..in_app_request(Uuid::new_v4())
    };
    let err = h.orchestrator.create_and_send(request).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn preference_deny_skips_without_persisting() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let mut pref = preference_with_email(&h, user_id).await;
    pref.categories.insert(
        "orders".to_string(),
        ScopedOverride {
            enabled: Some(false),
            channels: Default::default(),
            priority: None,
        },
    );
    h.preferences.upsert(&pref).await.unwrap();

    let result = h.orchestrator.create_and_send(email_request(user_id)).await.unwrap();
    let SendResult::Skipped { reason } = result else {
        panic!("expected skipped result");
    };
    assert!(reason.contains("category"));

    let listed = h
        .orchestrator
        .list_user_notifications(user_id, &ListNotificationsQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 0);
}

#[tokio::test]
async fn failed_delivery_persists_terminal_status() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::failed(
        "provider exploded",
    )))
    .await;
    let user_id = Uuid::new_v4();
    preference_with_email(&h, user_id).await;

    let result = h.orchestrator.create_and_send(email_request(user_id)).await.unwrap();
    let SendResult::Failed { notification } = result else {
        panic!("expected failed result");
    };
    assert_eq!(notification.status, NotificationStatus::Failed);
    assert_eq!(notification.error_message.as_deref(), Some("provider exploded"));

    let channel = h
        .channels
        .find_by_name("primary-email")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel.stats.failed, 1);
}

#[tokio::test]
async fn fail_open_without_preferences_still_requires_destination() {
    // no preference record: evaluation allows, but the real adapter has no
    // address to send to
    let h = harness(Arc::new(EmailAdapter::new())).await;
    let result = h
        .orchestrator
        .create_and_send(email_request(Uuid::new_v4()))
        .await
        .unwrap();
    let SendResult::Failed { notification } = result else {
        panic!("expected failed result");
    };
    assert!(notification
        .error_message
        .unwrap()
        .contains("no email settings on file"));
}

#[tokio::test]
async fn digest_frequency_queues_instead_of_sending() {
    let h = harness(Arc::new(EmailAdapter::new())).await;
    let user_id = Uuid::new_v4();
    let mut pref = preference_with_email(&h, user_id).await;
    pref.channels.email.frequency = DeliveryFrequency::Daily;
    h.preferences.upsert(&pref).await.unwrap();

    let result = h.orchestrator.create_and_send(email_request(user_id)).await.unwrap();
    let SendResult::Queued { notification } = result else {
        panic!("expected queued result");
    };
    assert_eq!(notification.status, NotificationStatus::Pending);
}

#[tokio::test]
async fn scheduled_notification_waits_for_its_time() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let request = CreateNotificationRequest {
        scheduled_for: Some(Utc::now() + Duration::hours(1)),
        ..in_app_request(user_id)
    };
    let result = h.orchestrator.create_and_send(request).await.unwrap();
    let SendResult::Scheduled { notification } = result else {
        panic!("expected scheduled result");
    };
    assert_eq!(notification.status, NotificationStatus::Pending);

    // not yet due: the sweep must leave it alone
    let report = h.orchestrator.process_scheduled(50).await.unwrap();
    assert_eq!(report.processed, 0);
    let stored = h
        .notifications
        .find_by_id(notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, NotificationStatus::Pending);

    // simulate the scheduled time elapsing
    let mut due = stored;
    due.scheduled_for = Utc::now() - Duration::seconds(1);
    h.notifications.update(&due).await.unwrap();

    let report = h.orchestrator.process_scheduled(50).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);
    let dispatched = h
        .notifications
        .find_by_id(due.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dispatched.status, NotificationStatus::Delivered);
}

#[tokio::test]
async fn batch_send_isolates_bad_items() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let mut bad = in_app_request(user_id);
    bad.user_id = Uuid::nil();
    let requests = vec![
        in_app_request(user_id),
        bad,
        in_app_request(user_id),
        in_app_request(user_id),
    ];

    let result = h.orchestrator.send_batch(requests).await;
    assert_eq!(result.total, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.sent, 3);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.items.len(), 4);
    assert_eq!(result.items[1].status, "failed");
    assert!(result.items[1].reason.is_some());
    assert_eq!(result.sent + result.skipped + result.failed, result.total);
}

#[tokio::test]
async fn expired_notifications_are_archived() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let result = h
        .orchestrator
        .create_and_send(CreateNotificationRequest {
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            ..in_app_request(user_id)
        })
        .await
        .unwrap();
    let notification = result.notification().unwrap().clone();

    let report = h.orchestrator.process_expired(50).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);

    let archived = h
        .notifications
        .find_by_id(notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.status, NotificationStatus::Archived);
    assert!(!archived.is_active);

    // sweep is idempotent: archived records are not picked up again
    let report = h.orchestrator.process_expired(50).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn read_tracking_and_unread_count() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let first = h
        .orchestrator
        .create_and_send(in_app_request(user_id))
        .await
        .unwrap()
        .notification()
        .unwrap()
        .clone();
    h.orchestrator
        .create_and_send(in_app_request(user_id))
        .await
        .unwrap();
    assert_eq!(h.orchestrator.count_unread(user_id).await.unwrap(), 2);

    let read = h.orchestrator.mark_read(first.id, user_id).await.unwrap();
    assert_eq!(read.status, NotificationStatus::Read);
    assert!(read.read_at.is_some());
    assert_eq!(h.orchestrator.count_unread(user_id).await.unwrap(), 1);

    // marking again is idempotent
    let again = h.orchestrator.mark_read(first.id, user_id).await.unwrap();
    assert_eq!(again.status, NotificationStatus::Read);

    let affected = h.orchestrator.mark_all_read(user_id).await.unwrap();
    assert_eq!(affected, 1);
    assert_eq!(h.orchestrator.count_unread(user_id).await.unwrap(), 0);

    // another user cannot touch the record
    let err = h
        .orchestrator
        .mark_read(first.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn archive_and_delete_lifecycle() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let notification = h
        .orchestrator
        .create_and_send(in_app_request(user_id))
        .await
        .unwrap()
        .notification()
        .unwrap()
        .clone();

    let archived = h.orchestrator.archive(notification.id, user_id).await.unwrap();
    assert_eq!(archived.status, NotificationStatus::Archived);
    // archived is terminal and idempotent
    let again = h.orchestrator.archive(notification.id, user_id).await.unwrap();
    assert_eq!(again.status, NotificationStatus::Archived);

    h.orchestrator.delete(notification.id, user_id).await.unwrap();
    let err = h
        .orchestrator
        .get_notification(notification.id)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn list_filters_unread_only() {
    let h = harness(MockEmailAdapter::sending(DeliveryOutcome::sent("x"))).await;
    let user_id = Uuid::new_v4();

    let first = h
        .orchestrator
        .create_and_send(in_app_request(user_id))
        .await
        .unwrap()
        .notification()
        .unwrap()
        .clone();
    h.orchestrator
        .create_and_send(in_app_request(user_id))
        .await
        .unwrap();
    h.orchestrator.mark_read(first.id, user_id).await.unwrap();

    let unread = h
        .orchestrator
        .list_user_notifications(
            user_id,
            &ListNotificationsQuery {
                unread_only: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unread.notifications.len(), 1);
    assert_eq!(unread.unread_count, 1);
}
