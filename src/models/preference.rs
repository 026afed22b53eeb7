//! User notification preference models
//!
//! One preference document per user. Scoped overrides (template > type >
//! category) refine the per-channel and global enabled flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// Quiet-hours window, evaluated in the user's timezone.
/// `start`/`end` are "HH:MM"; the window may wrap past midnight.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    pub start: String,
    pub end: String,
    /// IANA timezone name; unknown zones fall back to UTC
    pub timezone: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// How often email deliveries go out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryFrequency {
    #[default]
    Immediate,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InAppSettings {
    pub enabled: bool,
}

impl Default for InAppSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailSettings {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub frequency: DeliveryFrequency,
    /// "HH:MM" local time for digest assembly (digest itself is out of scope)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_time: Option<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            address: None,
            frequency: DeliveryFrequency::Immediate,
            digest_time: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SmsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Platform a push token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PushPlatform {
    Android,
    Ios,
    Web,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PushToken {
    pub token: String,
    pub platform: PushPlatform,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PushSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tokens: Vec<PushToken>,
}

/// A user-registered webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEndpoint {
    pub url: String,
    /// Payloads are HMAC-SHA256 signed when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Subscribed event types as "category.type"; "*" matches everything
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WebhookSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoints: Vec<WebhookEndpoint>,
}

/// Per-channel settings and delivery details
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChannelPreferences {
    #[serde(default)]
    pub in_app: InAppSettings,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub sms: SmsSettings,
    #[serde(default)]
    pub push: PushSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
}

/// Category/type/template-scoped override of the channel defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ScopedOverride {
    /// Scope-wide switch; None defers to less specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Per-channel switches keyed by channel name ("email", "sms", ...)
    #[serde(default)]
    pub channels: HashMap<String, bool>,
    /// Force a priority for matching notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<super::notification::NotificationPriority>,
}

/// One preference record per user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationPreference {
    pub user_id: Uuid,
    /// Global switch; off suppresses everything
    pub enabled: bool,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    #[serde(default)]
    pub channels: ChannelPreferences,
    /// Keyed by category name
    #[serde(default)]
    pub categories: HashMap<String, ScopedOverride>,
    /// Keyed by notification type
    #[serde(default)]
    pub types: HashMap<String, ScopedOverride>,
    /// Keyed by template name
    #[serde(default)]
    pub templates: HashMap<String, ScopedOverride>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    /// Defaults used on lazy first access
    pub fn defaults(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            enabled: true,
            quiet_hours: QuietHours::default(),
            channels: ChannelPreferences::default(),
            categories: HashMap::new(),
            types: HashMap::new(),
            templates: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to update a preference document; absent sections are kept
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdatePreferencesRequest {
    pub enabled: Option<bool>,
    pub quiet_hours: Option<QuietHours>,
    pub channels: Option<ChannelPreferences>,
    pub categories: Option<HashMap<String, ScopedOverride>>,
    pub types: Option<HashMap<String, ScopedOverride>>,
    pub templates: Option<HashMap<String, ScopedOverride>>,
}

impl UpdatePreferencesRequest {
    /// Merge this update into an existing preference document
    pub fn apply(self, pref: &mut NotificationPreference, now: DateTime<Utc>) {
        if let Some(enabled) = self.enabled {
            pref.enabled = enabled;
        }
        if let Some(quiet_hours) = self.quiet_hours {
            pref.quiet_hours = quiet_hours;
        }
        if let Some(channels) = self.channels {
            pref.channels = channels;
        }
        if let Some(categories) = self.categories {
            pref.categories = categories;
        }
        if let Some(types) = self.types {
            pref.types = types;
        }
        if let Some(templates) = self.templates {
            pref.templates = templates;
        }
        pref.updated_at = now;
    }
}

/// Destination details resolved from a user's preferences for dispatch.
/// Built fail-open: a missing preference record yields empty settings and
/// the adapters report a structured "no destination" outcome.
#[derive(Debug, Clone, Default)]
pub struct DeliverySettings {
    pub email: Option<EmailSettings>,
    pub sms: Option<SmsSettings>,
    pub push: Option<PushSettings>,
    pub webhook: Option<WebhookSettings>,
}

impl DeliverySettings {
    pub fn from_preference(pref: Option<&NotificationPreference>) -> Self {
        match pref {
            Some(p) => Self {
                email: Some(p.channels.email.clone()),
                sms: Some(p.channels.sms.clone()),
                push: Some(p.channels.push.clone()),
                webhook: Some(p.channels.webhook.clone()),
            },
            None => Self::default(),
        }
    }
}
