//! Webhook adapter tests against a local HTTP double.

use std::time::Instant;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_service::models::channel::{
    ChannelConfig, ChannelStats, ChannelStatus, ChannelType,
};
use notification_service::models::notification::{
    ChannelKind, Notification, NotificationPriority, NotificationStatus,
};
use notification_service::models::preference::{
    DeliverySettings, WebhookEndpoint, WebhookSettings,
};
use notification_service::services::channels::{ChannelAdapter, WebhookAdapter};
use notification_service::services::template::RenderedContent;

fn webhook_channel(name: &str, initial_delay_ms: u64, max_retries: u32) -> ChannelConfig {
    let now = Utc::now();
    ChannelConfig {
        id: Uuid::new_v4(),
        name: name.to_string(),
        display_name: name.to_string(),
        channel_type: ChannelType::Webhook,
        provider: "https".to_string(),
        config: json!({
            "timeout_secs": 5,
            "max_retries": max_retries,
            "initial_delay_ms": initial_delay_ms,
            "backoff_factor": 2.0,
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

fn notification(user_id: Uuid) -> Notification {
    let now = Utc::now();
    Notification {
        id: Uuid::new_v4(),
        user_id,
        notification_type: "order_shipped".to_string(),
        category: "orders".to_string(),
        title: "Order shipped".to_string(),
        message: "Your produce box is on the way".to_string(),
        data: json!({"order_id": "ord-123"}),
        priority: NotificationPriority::Normal,
        channel: ChannelKind::Webhook,
        template_name: None,
        actions: vec![],
        status: NotificationStatus::Pending,
        scheduled_for: now,
        expires_at: None,
        delivered_at: None,
        read_at: None,
        error_message: None,
        is_active: true,
        metadata: json!({}),
        created_at: now,
        updated_at: now,
    }
}

fn content(n: &Notification) -> RenderedContent {
    RenderedContent::literal(
        &n.title,
        &n.message,
        vec![],
        &n.notification_type,
        &n.category,
        n.priority,
        ChannelKind::Webhook,
    )
}

fn settings(url: String, secret: Option<&str>, events: &[&str]) -> DeliverySettings {
    DeliverySettings {
        webhook: Some(WebhookSettings {
            enabled: true,
            endpoints: vec![WebhookEndpoint {
                url,
                secret: secret.map(str::to_string),
                events: events.iter().map(|s| s.to_string()).collect(),
            }],
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new();
    let channel = webhook_channel("hooks", 50, 3);
    let n = notification(Uuid::new_v4());
    let started = Instant::now();

    let outcome = adapter
        .send(
            &n,
            &content(&n),
            &settings(format!("{}/hook", server.uri()), None, &[]),
            &channel,
        )
        .await;
    let elapsed = started.elapsed();

    assert!(outcome.success, "outcome: {:?}", outcome);
    assert!(outcome.message_id.is_some());
    // two backoffs: 50ms + 100ms, within a small tolerance
    assert!(
        elapsed.as_millis() >= 150,
        "elapsed only {:?}",
        elapsed
    );
    assert!(elapsed.as_millis() < 1000, "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn client_errors_are_terminal_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new();
    let channel = webhook_channel("hooks", 50, 3);
    let n = notification(Uuid::new_v4());

    let outcome = adapter
        .send(
            &n,
            &content(&n),
            &settings(format!("{}/hook", server.uri()), None, &[]),
            &channel,
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("404"));
}

#[tokio::test]
async fn retry_exhaustion_reports_terminal_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new();
    let channel = webhook_channel("hooks", 10, 2);
    let n = notification(Uuid::new_v4());

    let outcome = adapter
        .send(
            &n,
            &content(&n),
            &settings(format!("{}/hook", server.uri()), None, &[]),
            &channel,
        )
        .await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("retries exhausted"), "error: {}", error);
}

#[tokio::test]
async fn payload_is_signed_when_endpoint_has_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new();
    let channel = webhook_channel("hooks", 10, 1);
    let n = notification(Uuid::new_v4());
    let secret = "a-very-sufficiently-long-secret";

    let outcome = adapter
        .send(
            &n,
            &content(&n),
            &settings(format!("{}/hook", server.uri()), Some(secret), &[]),
            &channel,
        )
        .await;
    assert!(outcome.success);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(
        request.headers.get("X-FarmLink-Event").unwrap(),
        "orders.order_shipped"
    );
    let signature = request
        .headers
        .get("X-FarmLink-Signature")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let expected_hex = {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(&request.body);
        hex::encode(mac.finalize().into_bytes())
    };
    assert_eq!(signature, format!("sha256={}", expected_hex));

    // payload carries the notification envelope
    let payload: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(payload["event"], "orders.order_shipped");
    assert_eq!(payload["notification"]["title"], "Order shipped");
    assert_eq!(payload["data"]["order_id"], "ord-123");
}

#[tokio::test]
async fn unsubscribed_endpoints_are_filtered_out() {
    let server = MockServer::start().await;
    // nothing must reach the endpoint
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new();
    let channel = webhook_channel("hooks", 10, 1);
    let n = notification(Uuid::new_v4());

    let outcome = adapter
        .send(
            &n,
            &content(&n),
            &settings(
                format!("{}/hook", server.uri()),
                None,
                &["listings.created"],
            ),
            &channel,
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("no webhook endpoints subscribed"));
}

#[tokio::test]
async fn wildcard_subscription_receives_everything() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = WebhookAdapter::new();
    let channel = webhook_channel("hooks", 10, 1);
    let n = notification(Uuid::new_v4());

    let outcome = adapter
        .send(
            &n,
            &content(&n),
            &settings(format!("{}/hook", server.uri()), None, &["*"]),
            &channel,
        )
        .await;
    assert!(outcome.success);
}
