//! Channel adapters
//!
//! One adapter per delivery channel. Adapters translate rendered content
//! into provider-specific send calls and always report a structured
//! `DeliveryOutcome` instead of propagating errors, so the orchestrator
//! can persist a terminal status for every attempt.

pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;
pub mod webhook;

pub use email::EmailAdapter;
pub use in_app::{InAppAdapter, InAppEvent};
pub use push::PushAdapter;
pub use sms::SmsAdapter;
pub use webhook::WebhookAdapter;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::channel::ChannelConfig;
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::DeliverySettings;

use super::template::RenderedContent;

/// Provider-facing error classification
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Worth retrying: network failure, timeout, 5xx, 429
    #[error("retryable delivery error: {0}")]
    Retryable(String),
    /// Terminal: bad configuration, 4xx, rejected payload
    #[error("delivery failed: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retryable(_))
    }

    /// Classify a transport-level reqwest error. Timeouts and connection
    /// failures are retryable.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            DeliveryError::Retryable(e.to_string())
        } else {
            DeliveryError::Permanent(e.to_string())
        }
    }

    /// Classify an HTTP response status: 5xx and 429 are retryable
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            DeliveryError::Retryable(format!("provider returned {}", status))
        } else {
            DeliveryError::Permanent(format!("provider returned {}", status))
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Accepted but intentionally not sent yet (e.g. digest email)
    pub queued: bool,
    /// Delivery confirmed immediately (always true for in-app)
    pub delivered: bool,
}

impl DeliveryOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            ..Default::default()
        }
    }

    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            delivered: true,
            ..Default::default()
        }
    }

    pub fn queued() -> Self {
        Self {
            success: true,
            queued: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Aggregate per-destination outcomes (webhook endpoints, push tokens)
    /// into one: success when anything went out, ids and errors joined.
    pub fn aggregate(outcomes: Vec<DeliveryOutcome>) -> Self {
        if outcomes.is_empty() {
            return DeliveryOutcome::failed("no destinations");
        }
        let success = outcomes.iter().any(|o| o.success);
        let message_ids: Vec<String> =
            outcomes.iter().filter_map(|o| o.message_id.clone()).collect();
        let errors: Vec<String> = outcomes.iter().filter_map(|o| o.error.clone()).collect();
        Self {
            success,
            message_id: if message_ids.is_empty() {
                None
            } else {
                Some(message_ids.join(","))
            },
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
            queued: outcomes.iter().all(|o| o.queued),
            delivered: false,
        }
    }
}

impl From<DeliveryError> for DeliveryOutcome {
    fn from(e: DeliveryError) -> Self {
        DeliveryOutcome::failed(e.to_string())
    }
}

/// A delivery channel adapter.
///
/// `initialize_channel` builds and caches a provider client for the named
/// channel configuration; it is idempotent and cheap to repeat, so
/// concurrent first-use races are harmless. `send` never errors: provider
/// failures come back as `success == false` outcomes.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn initialize_channel(&self, channel: &ChannelConfig) -> Result<(), DeliveryError>;

    async fn send(
        &self,
        notification: &Notification,
        content: &RenderedContent,
        settings: &DeliverySettings,
        channel: &ChannelConfig,
    ) -> DeliveryOutcome;
}
