//! Webhook channel adapter
//!
//! Iterates the user's registered endpoints, filtering by event-type
//! subscription ("category.type", "category.*" or "*"). Payloads are
//! HMAC-SHA256 signed over the exact JSON body when the endpoint declares
//! a secret; bearer/basic auth headers come from the channel config.
//! Sends run through the bounded-backoff retry policy with a per-channel
//! request timeout.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::channel::ChannelConfig;
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::{DeliverySettings, WebhookEndpoint};
use crate::services::retry::RetryPolicy;
use crate::services::template::RenderedContent;

use super::{ChannelAdapter, DeliveryError, DeliveryOutcome};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
struct WebhookChannelSettings {
    #[serde(default)]
    bearer_token: Option<String>,
    #[serde(default)]
    basic_username: Option<String>,
    #[serde(default)]
    basic_password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_retry_enabled")]
    retry_enabled: bool,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    backoff_factor: f64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl WebhookChannelSettings {
    fn retry_policy(&self) -> RetryPolicy {
        if !self.retry_enabled {
            return RetryPolicy::disabled();
        }
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            ..Default::default()
        }
    }
}

/// Whether an endpoint subscription list covers the event. An empty list
/// subscribes to everything.
pub fn endpoint_subscribed(endpoint: &WebhookEndpoint, event: &str) -> bool {
    if endpoint.events.is_empty() {
        return true;
    }
    endpoint.events.iter().any(|pattern| {
        if pattern == "*" || pattern == event {
            return true;
        }
        // "orders.*" covers every type in the category
        pattern
            .strip_suffix(".*")
            .is_some_and(|prefix| event.split('.').next() == Some(prefix))
    })
}

fn sign_payload(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Webhook channel adapter
pub struct WebhookAdapter {
    clients: DashMap<String, reqwest::Client>,
}

impl WebhookAdapter {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn parse_settings(channel: &ChannelConfig) -> Result<WebhookChannelSettings, DeliveryError> {
        serde_json::from_value(channel.config.clone())
            .map_err(|e| DeliveryError::Permanent(format!("invalid webhook channel config: {}", e)))
    }

    async fn deliver_endpoint(
        &self,
        client: &reqwest::Client,
        settings: &WebhookChannelSettings,
        endpoint: &WebhookEndpoint,
        event_id: &str,
        event: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let policy = settings.retry_policy();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = endpoint
            .secret
            .as_deref()
            .map(|secret| sign_payload(secret, body));

        policy
            .execute(|| {
                let mut request = client
                    .post(&endpoint.url)
                    .header("Content-Type", "application/json")
                    .header("X-FarmLink-Event", event)
                    .header("X-FarmLink-Delivery", event_id)
                    .header("X-FarmLink-Timestamp", &timestamp)
                    .body(body.to_string());
                if let Some(signature) = &signature {
                    request =
                        request.header("X-FarmLink-Signature", format!("sha256={}", signature));
                }
                if let Some(token) = &settings.bearer_token {
                    request = request.bearer_auth(token);
                }
                if let (Some(username), Some(password)) =
                    (&settings.basic_username, &settings.basic_password)
                {
                    let credentials = BASE64.encode(format!("{}:{}", username, password));
                    request = request.header("Authorization", format!("Basic {}", credentials));
                }

                async move {
                    let response = request.send().await.map_err(DeliveryError::from_reqwest)?;
                    let status = response.status();
                    if status.is_success() {
                        Ok(())
                    } else {
                        Err(DeliveryError::from_status(status))
                    }
                }
            })
            .await
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn initialize_channel(&self, channel: &ChannelConfig) -> Result<(), DeliveryError> {
        if self.clients.contains_key(&channel.name) {
            return Ok(());
        }
        let settings = Self::parse_settings(channel)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        self.clients.insert(channel.name.clone(), client);
        info!(channel = %channel.name, "webhook channel initialized");
        Ok(())
    }

    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
        settings: &DeliverySettings,
        channel: &ChannelConfig,
    ) -> DeliveryOutcome {
        let Some(webhook_settings) = &settings.webhook else {
            return DeliveryOutcome::failed("no webhook settings on file");
        };
        if webhook_settings.endpoints.is_empty() {
            return DeliveryOutcome::failed("no webhook endpoints on file");
        }

        if let Err(e) = self.initialize_channel(channel).await {
            return e.into();
        }
        let client = match self.clients.get(&channel.name) {
            Some(entry) => entry.value().clone(),
            None => return DeliveryOutcome::failed("webhook channel not initialized"),
        };
        let channel_settings = match Self::parse_settings(channel) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };

        let event = format!("{}.{}", content.category, content.notification_type);
        let subscribed: Vec<&WebhookEndpoint> = webhook_settings
            .endpoints
            .iter()
            .filter(|e| endpoint_subscribed(e, &event))
            .collect();
        if subscribed.is_empty() {
            return DeliveryOutcome::failed(format!(
                "no webhook endpoints subscribed to {}",
                event
            ));
        }

        let mut outcomes = Vec::with_capacity(subscribed.len());
        for endpoint in subscribed {
            let event_id = Uuid::new_v4().to_string();
            let payload = serde_json::json!({
                "id": event_id,
                "event": event,
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "notification": {
                    "id": notification.id,
                    "user_id": notification.user_id,
                    "type": content.notification_type,
                    "category": content.category,
                    "title": content.title,
                    "message": content.message,
                    "priority": content.priority,
                },
                "data": content.webhook.clone().unwrap_or_else(|| notification.data.clone()),
            });
            let body = match serde_json::to_string(&payload) {
                Ok(body) => body,
                Err(e) => {
                    outcomes.push(DeliveryOutcome::failed(format!(
                        "{}: failed to encode payload: {}",
                        endpoint.url, e
                    )));
                    continue;
                }
            };

            match self
                .deliver_endpoint(&client, &channel_settings, endpoint, &event_id, &event, &body)
                .await
            {
                Ok(()) => outcomes.push(DeliveryOutcome::sent(event_id)),
                Err(e) => {
                    warn!(
                        notification_id = %notification.id,
                        endpoint = %endpoint.url,
                        error = %e,
                        "webhook delivery failed"
                    );
                    outcomes.push(DeliveryOutcome::failed(format!("{}: {}", endpoint.url, e)));
                }
            }
        }

        DeliveryOutcome::aggregate(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(events: &[&str]) -> WebhookEndpoint {
        WebhookEndpoint {
            url: "https://example.com/hook".to_string(),
            secret: None,
            events: events.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_subscription_exact_match() {
        assert!(endpoint_subscribed(
            &endpoint(&["orders.order_shipped"]),
            "orders.order_shipped"
        ));
        assert!(!endpoint_subscribed(
            &endpoint(&["orders.order_shipped"]),
            "orders.order_cancelled"
        ));
    }

    #[test]
    fn test_subscription_wildcards() {
        assert!(endpoint_subscribed(&endpoint(&["*"]), "anything.at_all"));
        assert!(endpoint_subscribed(&endpoint(&["orders.*"]), "orders.order_paid"));
        assert!(!endpoint_subscribed(&endpoint(&["orders.*"]), "listings.created"));
    }

    #[test]
    fn test_subscription_empty_list_matches_everything() {
        assert!(endpoint_subscribed(&endpoint(&[]), "orders.order_shipped"));
    }

    #[test]
    fn test_signature_is_stable_hex() {
        let a = sign_payload("secret-key", r#"{"id":1}"#);
        let b = sign_payload("secret-key", r#"{"id":1}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let c = sign_payload("other-key", r#"{"id":1}"#);
        assert_ne!(a, c);
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings: WebhookChannelSettings = serde_json::from_value(serde_json::json!({
            "retry_enabled": false
        }))
        .unwrap();
        assert_eq!(settings.retry_policy().max_attempts, 1);

        let settings: WebhookChannelSettings = serde_json::from_value(serde_json::json!({
            "max_retries": 5,
            "initial_delay_ms": 100,
            "backoff_factor": 3.0
        }))
        .unwrap();
        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
    }
}
