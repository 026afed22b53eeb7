//! Channel configuration models
//!
//! Administrator-managed delivery channel instances, e.g. "primary-smtp"
//! or "twilio-prod". The Channel Registry reads these records to build
//! provider adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::notification::ChannelKind;
use super::ParseEnumError;

/// Tag marking the default channel for its type
pub const DEFAULT_TAG: &str = "default";

/// What kind of deliveries a configured channel performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelType {
    InApp,
    Email,
    Sms,
    Push,
    Webhook,
    Custom,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::InApp => "in-app",
            ChannelType::Email => "email",
            ChannelType::Sms => "sms",
            ChannelType::Push => "push",
            ChannelType::Webhook => "webhook",
            ChannelType::Custom => "custom",
        }
    }

    /// The delivery channel this configuration serves, if any
    pub fn kind(&self) -> Option<ChannelKind> {
        match self {
            ChannelType::InApp => Some(ChannelKind::InApp),
            ChannelType::Email => Some(ChannelKind::Email),
            ChannelType::Sms => Some(ChannelKind::Sms),
            ChannelType::Push => Some(ChannelKind::Push),
            ChannelType::Webhook => Some(ChannelKind::Webhook),
            ChannelType::Custom => None,
        }
    }
}

impl From<ChannelKind> for ChannelType {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::InApp => ChannelType::InApp,
            ChannelKind::Email => ChannelType::Email,
            ChannelKind::Sms => ChannelType::Sms,
            ChannelKind::Push => ChannelType::Push,
            ChannelKind::Webhook => ChannelType::Webhook,
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-app" | "in_app" => Ok(ChannelType::InApp),
            "email" => Ok(ChannelType::Email),
            "sms" => Ok(ChannelType::Sms),
            "push" => Ok(ChannelType::Push),
            "webhook" => Ok(ChannelType::Webhook),
            "custom" => Ok(ChannelType::Custom),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Operational status of a configured channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Active,
    Inactive,
    Testing,
    Error,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Active => "active",
            ChannelStatus::Inactive => "inactive",
            ChannelStatus::Testing => "testing",
            ChannelStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChannelStatus::Active),
            "inactive" => Ok(ChannelStatus::Inactive),
            "testing" => Ok(ChannelStatus::Testing),
            "error" => Ok(ChannelStatus::Error),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Cumulative delivery statistics for a channel
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChannelStats {
    pub sent: i64,
    pub delivered: i64,
    pub failed: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sent_at: Option<DateTime<Utc>>,
}

/// A configured delivery channel record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChannelConfig {
    pub id: Uuid,
    /// Unique name, e.g. "primary-smtp"
    pub name: String,
    pub display_name: String,
    pub channel_type: ChannelType,
    /// Provider identifier, e.g. "smtp", "twilio", "fcm"
    pub provider: String,
    /// Provider-specific configuration blob
    pub config: serde_json::Value,
    pub status: ChannelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form tags; `default` marks the type's default channel
    pub tags: Vec<String>,
    pub stats: ChannelStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelConfig {
    pub fn is_default(&self) -> bool {
        self.tags.iter().any(|t| t == DEFAULT_TAG)
    }

    /// Synthetic configuration for the in-app channel, which needs no
    /// provider and may have no stored record
    pub fn builtin_in_app(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::nil(),
            name: "in-app".to_string(),
            display_name: "In-app".to_string(),
            channel_type: ChannelType::InApp,
            provider: "builtin".to_string(),
            config: serde_json::json!({}),
            status: ChannelStatus::Active,
            error_message: None,
            tags: vec![DEFAULT_TAG.to_string()],
            stats: ChannelStats::default(),
            last_tested_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create a channel
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateChannelRequest {
    #[validate(length(min = 1, message = "channel name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "display name is required"))]
    pub display_name: String,
    pub channel_type: ChannelType,
    #[validate(length(min = 1, message = "provider is required"))]
    pub provider: String,
    pub config: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
}

/// Request to update a channel; absent fields are kept
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateChannelRequest {
    pub display_name: Option<String>,
    pub provider: Option<String>,
    pub config: Option<serde_json::Value>,
    pub status: Option<ChannelStatus>,
    pub tags: Option<Vec<String>>,
}
