//! Email channel adapter
//!
//! Supports SMTP (lettre) and HTTP transactional-email providers behind
//! the `EmailProvider` trait; the concrete provider is selected from the
//! channel configuration at initialization time and cached per channel
//! name. Non-immediate delivery frequency short-circuits to a queued
//! outcome; digest assembly is out of scope.

use async_trait::async_trait;
use dashmap::DashMap;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::channel::ChannelConfig;
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::{DeliveryFrequency, DeliverySettings};
use crate::services::template::RenderedContent;

use super::{ChannelAdapter, DeliveryError, DeliveryOutcome};

/// Provider-specific section of the channel config blob
#[derive(Debug, Clone, Deserialize)]
struct EmailChannelSettings {
    #[serde(default)]
    smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    #[serde(default)]
    smtp_username: Option<String>,
    #[serde(default)]
    smtp_password: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    from_name: String,
    from_address: String,
    #[serde(default)]
    reply_to: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

/// A fully addressed, rendered email ready for a provider
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub from_name: String,
    pub from_address: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

#[async_trait]
trait EmailProvider: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String, DeliveryError>;
}

/// SMTP delivery via lettre
struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    fn build(settings: &EmailChannelSettings) -> Result<Self, DeliveryError> {
        let host = settings
            .smtp_host
            .as_deref()
            .ok_or_else(|| DeliveryError::Permanent("smtp_host is not configured".to_string()))?;

        // Port 1025 is the local MailHog-style dev relay: no TLS, no auth
        let transport = if settings.smtp_port == 1025 {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(settings.smtp_port)
                .build()
        } else {
            let username = settings.smtp_username.clone().ok_or_else(|| {
                DeliveryError::Permanent("smtp_username is not configured".to_string())
            })?;
            let password = settings.smtp_password.clone().ok_or_else(|| {
                DeliveryError::Permanent("smtp_password is not configured".to_string())
            })?;
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| DeliveryError::Permanent(format!("invalid SMTP relay: {}", e)))?
                .port(settings.smtp_port)
                .credentials(Credentials::new(username, password))
                .build()
        };

        Ok(Self { transport })
    }
}

#[async_trait]
impl EmailProvider for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, DeliveryError> {
        let from: Mailbox = format!("{} <{}>", message.from_name, message.from_address)
            .parse()
            .map_err(|e| DeliveryError::Permanent(format!("invalid from address: {}", e)))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| DeliveryError::Permanent(format!("invalid recipient address: {}", e)))?;

        let mut builder = Message::builder().from(from).to(to).subject(&message.subject);
        if let Some(reply_to) = &message.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|e| DeliveryError::Permanent(format!("invalid reply-to: {}", e)))?;
            builder = builder.reply_to(mailbox);
        }

        let email = match &message.html_body {
            Some(html) => builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(message.text_body.clone()),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(html.clone()),
                        ),
                )
                .map_err(|e| DeliveryError::Permanent(format!("failed to build email: {}", e)))?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.text_body.clone())
                .map_err(|e| DeliveryError::Permanent(format!("failed to build email: {}", e)))?,
        };

        self.transport.send(email).await.map_err(|e| {
            if e.is_transient() {
                DeliveryError::Retryable(e.to_string())
            } else {
                DeliveryError::Permanent(e.to_string())
            }
        })?;

        Ok(format!("smtp-{}", Uuid::new_v4()))
    }
}

/// HTTP transactional-email API delivery (SendGrid-style JSON POST)
struct ApiMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ApiMailer {
    fn build(settings: &EmailChannelSettings) -> Result<Self, DeliveryError> {
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
        })
    }
}

#[async_trait]
impl EmailProvider for ApiMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, DeliveryError> {
        let body = serde_json::json!({
            "from": {"name": message.from_name, "email": message.from_address},
            "to": message.to,
            "reply_to": message.reply_to,
            "subject": message.subject,
            "text": message.text_body,
            "html": message.html_body,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(DeliveryError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::from_status(status));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let message_id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("email-{}", Uuid::new_v4()));
        Ok(message_id)
    }
}

/// Email channel adapter
pub struct EmailAdapter {
    clients: DashMap<String, Arc<dyn EmailProvider>>,
}

impl EmailAdapter {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn parse_settings(channel: &ChannelConfig) -> Result<EmailChannelSettings, DeliveryError> {
        serde_json::from_value(channel.config.clone())
            .map_err(|e| DeliveryError::Permanent(format!("invalid email channel config: {}", e)))
    }
}

impl Default for EmailAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn initialize_channel(&self, channel: &ChannelConfig) -> Result<(), DeliveryError> {
        if self.clients.contains_key(&channel.name) {
            return Ok(());
        }
        let settings = Self::parse_settings(channel)?;
        let provider: Arc<dyn EmailProvider> = match channel.provider.as_str() {
            "smtp" => Arc::new(SmtpMailer::build(&settings)?),
            "http-api" | "sendgrid" | "postmark" => Arc::new(ApiMailer::build(&settings)?),
            other => {
                return Err(DeliveryError::Permanent(format!(
                    "unsupported email provider: {}",
                    other
                )));
            }
        };
        self.clients.insert(channel.name.clone(), provider);
        info!(channel = %channel.name, provider = %channel.provider, "email channel initialized");
        Ok(())
    }

    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
        settings: &DeliverySettings,
        channel: &ChannelConfig,
    ) -> DeliveryOutcome {
        let Some(email_settings) = &settings.email else {
            return DeliveryOutcome::failed("no email settings on file");
        };
        let Some(address) = &email_settings.address else {
            return DeliveryOutcome::failed("no email address on file");
        };

        // Digest delivery is assembled elsewhere; acknowledge and stop
        if email_settings.frequency != DeliveryFrequency::Immediate {
            return DeliveryOutcome::queued();
        }

        if let Err(e) = self.initialize_channel(channel).await {
            return e.into();
        }
        let provider = match self.clients.get(&channel.name) {
            Some(entry) => Arc::clone(entry.value()),
            None => return DeliveryOutcome::failed("email channel not initialized"),
        };

        let channel_settings = match Self::parse_settings(channel) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };

        let rendered = content.email.clone().unwrap_or_else(|| {
            crate::services::template::RenderedEmail {
                subject: content.title.clone(),
                html_body: None,
                text_body: content.message.clone(),
            }
        });

        let message = EmailMessage {
            to: address.clone(),
            from_name: channel_settings.from_name,
            from_address: channel_settings.from_address,
            reply_to: channel_settings.reply_to,
            subject: rendered.subject,
            text_body: rendered.text_body,
            html_body: rendered.html_body,
        };

        match provider.send(&message).await {
            Ok(message_id) => DeliveryOutcome::sent(message_id),
            Err(e) => {
                warn!(
                    notification_id = %notification.id,
                    channel = %channel.name,
                    error = %e,
                    "email delivery failed"
                );
                e.into()
            }
        }
    }
}
