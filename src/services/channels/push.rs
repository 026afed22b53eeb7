//! Push channel adapter
//!
//! Destination tokens are grouped by platform. Android/iOS tokens go out
//! through one FCM-style multicast call; web tokens ride the same
//! multicast (with web-specific payload fields) unless the channel
//! configures a standards-based web-push provider, in which case each
//! subscription endpoint is posted to directly. Per-token successes and
//! failures aggregate into a single outcome.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::channel::ChannelConfig;
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::{DeliverySettings, PushPlatform};
use crate::services::template::RenderedContent;

use super::{ChannelAdapter, DeliveryError, DeliveryOutcome};

const DEFAULT_FCM_URL: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Debug, Clone, Deserialize)]
struct PushChannelSettings {
    #[serde(default)]
    api_url: Option<String>,
    server_key: Option<String>,
    /// "webpush" routes web tokens through per-endpoint posts
    #[serde(default)]
    web_provider: Option<String>,
    #[serde(default = "default_ttl_secs")]
    ttl_secs: u32,
}

fn default_ttl_secs() -> u32 {
    3600
}

/// Payload handed to a push provider
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    /// Include web-specific payload fields in the multicast body
    pub for_web: bool,
}

/// Per-token send result
#[derive(Debug, Clone)]
struct TokenOutcome {
    token: String,
    message_id: Option<String>,
    error: Option<String>,
}

impl TokenOutcome {
    fn into_delivery(self) -> DeliveryOutcome {
        match (self.message_id, self.error) {
            (Some(id), _) => DeliveryOutcome::sent(id),
            (None, Some(error)) => DeliveryOutcome::failed(format!("{}: {}", self.token, error)),
            (None, None) => DeliveryOutcome::failed(format!("{}: no result", self.token)),
        }
    }
}

#[async_trait]
trait PushProvider: Send + Sync {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, DeliveryError>;
}

/// FCM legacy-HTTP-style multicast provider
struct FcmPush {
    client: reqwest::Client,
    api_url: String,
    server_key: String,
}

impl FcmPush {
    fn build(settings: &PushChannelSettings) -> Result<Self, DeliveryError> {
        let server_key = settings
            .server_key
            .clone()
            .ok_or_else(|| DeliveryError::Permanent("server_key is not configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            api_url: settings
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_FCM_URL.to_string()),
            server_key,
        })
    }
}

#[async_trait]
impl PushProvider for FcmPush {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, DeliveryError> {
        let mut body = serde_json::json!({
            "registration_ids": tokens,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": message.data,
        });
        if message.for_web {
            body["webpush"] = serde_json::json!({
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
            });
        }

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await
            .map_err(DeliveryError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::from_status(status));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let results = payload
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let result = results.get(i);
                TokenOutcome {
                    token: token.clone(),
                    message_id: result
                        .and_then(|r| r.get("message_id"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    error: result
                        .and_then(|r| r.get("error"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                }
            })
            .collect())
    }
}

/// Standards-based web push: one POST per subscription endpoint
struct WebPush {
    client: reqwest::Client,
    ttl_secs: u32,
}

impl WebPush {
    fn build(settings: &PushChannelSettings) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            ttl_secs: settings.ttl_secs,
        })
    }
}

#[async_trait]
impl PushProvider for WebPush {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, DeliveryError> {
        let payload = serde_json::json!({
            "title": message.title,
            "body": message.body,
            "data": message.data,
        });

        let mut outcomes = Vec::with_capacity(tokens.len());
        for endpoint in tokens {
            let result = self
                .client
                .post(endpoint)
                .header("TTL", self.ttl_secs.to_string())
                .json(&payload)
                .send()
                .await;
            let outcome = match result {
                Ok(response) if response.status().is_success() => TokenOutcome {
                    token: endpoint.clone(),
                    message_id: Some(format!("webpush-{}", uuid::Uuid::new_v4())),
                    error: None,
                },
                Ok(response) => TokenOutcome {
                    token: endpoint.clone(),
                    message_id: None,
                    error: Some(format!("endpoint returned {}", response.status())),
                },
                Err(e) => TokenOutcome {
                    token: endpoint.clone(),
                    message_id: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// Push channel adapter
pub struct PushAdapter {
    multicast: DashMap<String, Arc<dyn PushProvider>>,
    web: DashMap<String, Arc<dyn PushProvider>>,
}

impl PushAdapter {
    pub fn new() -> Self {
        Self {
            multicast: DashMap::new(),
            web: DashMap::new(),
        }
    }

    fn parse_settings(channel: &ChannelConfig) -> Result<PushChannelSettings, DeliveryError> {
        serde_json::from_value(channel.config.clone())
            .map_err(|e| DeliveryError::Permanent(format!("invalid push channel config: {}", e)))
    }
}

impl Default for PushAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn initialize_channel(&self, channel: &ChannelConfig) -> Result<(), DeliveryError> {
        if self.multicast.contains_key(&channel.name) {
            return Ok(());
        }
        let settings = Self::parse_settings(channel)?;
        match channel.provider.as_str() {
            "fcm" => {
                self.multicast
                    .insert(channel.name.clone(), Arc::new(FcmPush::build(&settings)?));
            }
            other => {
                return Err(DeliveryError::Permanent(format!(
                    "unsupported push provider: {}",
                    other
                )));
            }
        }
        if settings.web_provider.as_deref() == Some("webpush") {
            self.web
                .insert(channel.name.clone(), Arc::new(WebPush::build(&settings)?));
        }
        info!(channel = %channel.name, provider = %channel.provider, "push channel initialized");
        Ok(())
    }

    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
        settings: &DeliverySettings,
        channel: &ChannelConfig,
    ) -> DeliveryOutcome {
        let Some(push_settings) = &settings.push else {
            return DeliveryOutcome::failed("no push settings on file");
        };
        if push_settings.tokens.is_empty() {
            return DeliveryOutcome::failed("no push tokens on file");
        }

        if let Err(e) = self.initialize_channel(channel).await {
            return e.into();
        }
        let multicast = match self.multicast.get(&channel.name) {
            Some(entry) => Arc::clone(entry.value()),
            None => return DeliveryOutcome::failed("push channel not initialized"),
        };
        let web = self
            .web
            .get(&channel.name)
            .map(|entry| Arc::clone(entry.value()));

        let rendered = content.push.clone().unwrap_or_else(|| {
            crate::services::template::RenderedPush {
                title: content.title.clone(),
                body: content.message.clone(),
            }
        });
        let data = serde_json::json!({
            "notification_id": notification.id,
            "type": content.notification_type,
            "category": content.category,
        });

        let mobile_tokens: Vec<String> = push_settings
            .tokens
            .iter()
            .filter(|t| matches!(t.platform, PushPlatform::Android | PushPlatform::Ios))
            .map(|t| t.token.clone())
            .collect();
        let web_tokens: Vec<String> = push_settings
            .tokens
            .iter()
            .filter(|t| t.platform == PushPlatform::Web)
            .map(|t| t.token.clone())
            .collect();

        let mut outcomes: Vec<DeliveryOutcome> = Vec::new();

        if !mobile_tokens.is_empty() {
            let message = PushMessage {
                title: rendered.title.clone(),
                body: rendered.body.clone(),
                data: data.clone(),
                for_web: false,
            };
            match multicast.send_multicast(&mobile_tokens, &message).await {
                Ok(results) => outcomes.extend(results.into_iter().map(TokenOutcome::into_delivery)),
                Err(e) => outcomes.push(e.into()),
            }
        }

        if !web_tokens.is_empty() {
            let message = PushMessage {
                title: rendered.title,
                body: rendered.body,
                data,
                for_web: true,
            };
            // web tokens prefer the dedicated web-push provider when one
            // is configured, otherwise they ride the multicast call
            let provider = web.as_ref().unwrap_or(&multicast);
            match provider.send_multicast(&web_tokens, &message).await {
                Ok(results) => outcomes.extend(results.into_iter().map(TokenOutcome::into_delivery)),
                Err(e) => outcomes.push(e.into()),
            }
        }

        let merged = DeliveryOutcome::aggregate(outcomes);
        if !merged.success {
            warn!(
                notification_id = %notification.id,
                channel = %channel.name,
                error = merged.error.as_deref().unwrap_or("unknown"),
                "push delivery failed"
            );
        }
        merged
    }
}
