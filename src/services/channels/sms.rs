//! SMS channel adapter
//!
//! Twilio-style form POST or generic JSON POST providers behind the
//! `SmsProvider` trait. Message bodies are held to a 160-character
//! budget; the notification title is prefixed only when the body does
//! not already carry it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::channel::ChannelConfig;
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::DeliverySettings;
use crate::services::template::RenderedContent;

use super::{ChannelAdapter, DeliveryError, DeliveryOutcome};

/// One SMS fits 160 GSM-7 characters; longer bodies are truncated rather
/// than split into segments
const SMS_CHAR_BUDGET: usize = 160;

#[derive(Debug, Clone, Deserialize)]
struct SmsChannelSettings {
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    account_sid: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    from_number: String,
}

#[async_trait]
trait SmsProvider: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<String, DeliveryError>;
}

/// Twilio-compatible Messages API (form-encoded POST, basic auth)
struct TwilioSms {
    client: reqwest::Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSms {
    fn build(settings: &SmsChannelSettings) -> Result<Self, DeliveryError> {
        let account_sid = settings
            .account_sid
            .clone()
            .ok_or_else(|| DeliveryError::Permanent("account_sid is not configured".to_string()))?;
        let auth_token = settings
            .auth_token
            .clone()
            .ok_or_else(|| DeliveryError::Permanent("auth_token is not configured".to_string()))?;
        let api_url = settings.api_url.clone().unwrap_or_else(|| {
            format!(
                "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
                account_sid
            )
        });
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            account_sid,
            auth_token,
            from_number: settings.from_number.clone(),
        })
    }
}

#[async_trait]
impl SmsProvider for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> Result<String, DeliveryError> {
        let params = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];
        let response = self
            .client
            .post(&self.api_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(DeliveryError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::from_status(status));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(payload
            .get("sid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("sms-{}", Uuid::new_v4())))
    }
}

/// Generic JSON gateway (bearer-authenticated POST)
struct HttpSms {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_number: String,
}

impl HttpSms {
    fn build(settings: &SmsChannelSettings) -> Result<Self, DeliveryError> {
        let api_url = settings
            .api_url
            .clone()
            .ok_or_else(|| DeliveryError::Permanent("api_url is not configured".to_string()))?;
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| DeliveryError::Permanent("api_key is not configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            api_key,
            from_number: settings.from_number.clone(),
        })
    }
}

#[async_trait]
impl SmsProvider for HttpSms {
    async fn send(&self, to: &str, body: &str) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "to": to,
                "from": self.from_number,
                "body": body,
            }))
            .send()
            .await
            .map_err(DeliveryError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::from_status(status));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(payload
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("sms-{}", Uuid::new_v4())))
    }
}

/// Compose the wire body: prefix the title only when the text does not
/// already contain it, then truncate to the character budget.
pub fn compose_body(title: &str, text: &str) -> String {
    let body = if !title.is_empty() && !text.contains(title) {
        format!("{}: {}", title, text)
    } else {
        text.to_string()
    };
    body.chars().take(SMS_CHAR_BUDGET).collect()
}

/// SMS channel adapter
pub struct SmsAdapter {
    clients: DashMap<String, Arc<dyn SmsProvider>>,
}

impl SmsAdapter {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn parse_settings(channel: &ChannelConfig) -> Result<SmsChannelSettings, DeliveryError> {
        serde_json::from_value(channel.config.clone())
            .map_err(|e| DeliveryError::Permanent(format!("invalid sms channel config: {}", e)))
    }
}

impl Default for SmsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn initialize_channel(&self, channel: &ChannelConfig) -> Result<(), DeliveryError> {
        if self.clients.contains_key(&channel.name) {
            return Ok(());
        }
        let settings = Self::parse_settings(channel)?;
        let provider: Arc<dyn SmsProvider> = match channel.provider.as_str() {
            "twilio" => Arc::new(TwilioSms::build(&settings)?),
            "http-api" => Arc::new(HttpSms::build(&settings)?),
            other => {
                return Err(DeliveryError::Permanent(format!(
                    "unsupported sms provider: {}",
                    other
                )));
            }
        };
        self.clients.insert(channel.name.clone(), provider);
        info!(channel = %channel.name, provider = %channel.provider, "sms channel initialized");
        Ok(())
    }

    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
        settings: &DeliverySettings,
        channel: &ChannelConfig,
    ) -> DeliveryOutcome {
        let Some(sms_settings) = &settings.sms else {
            return DeliveryOutcome::failed("no sms settings on file");
        };
        let Some(phone_number) = &sms_settings.phone_number else {
            return DeliveryOutcome::failed("no phone number on file");
        };

        if let Err(e) = self.initialize_channel(channel).await {
            return e.into();
        }
        let provider = match self.clients.get(&channel.name) {
            Some(entry) => Arc::clone(entry.value()),
            None => return DeliveryOutcome::failed("sms channel not initialized"),
        };

        let text = content
            .sms
            .as_ref()
            .map(|s| s.text.clone())
            .unwrap_or_else(|| content.message.clone());
        let body = compose_body(&content.title, &text);

        match provider.send(phone_number, &body).await {
            Ok(message_id) => DeliveryOutcome::sent(message_id),
            Err(e) => {
                warn!(
                    notification_id = %notification.id,
                    channel = %channel.name,
                    error = %e,
                    "sms delivery failed"
                );
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prefixes_title_when_absent() {
        let body = compose_body("Order shipped", "Your produce box is on the way");
        assert_eq!(body, "Order shipped: Your produce box is on the way");
    }

    #[test]
    fn test_compose_skips_title_when_present() {
        let body = compose_body("Order shipped", "Order shipped today, track it online");
        assert_eq!(body, "Order shipped today, track it online");
    }

    #[test]
    fn test_compose_truncates_to_budget() {
        let long = "x".repeat(400);
        let body = compose_body("Alert", &long);
        assert_eq!(body.chars().count(), SMS_CHAR_BUDGET);
        assert!(body.starts_with("Alert: "));
    }

    #[test]
    fn test_compose_truncates_on_char_boundary() {
        let long = "ñ".repeat(200);
        let body = compose_body("", &long);
        assert_eq!(body.chars().count(), SMS_CHAR_BUDGET);
    }
}
