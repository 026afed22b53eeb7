//! Preference evaluation
//!
//! Pure decision logic: user preference record + (category, type, channel,
//! priority, template) -> allow/deny. Most specific override wins:
//! template > type > category > channel flag > global flag. Quiet hours
//! suppress non-urgent deliveries inside the configured window, evaluated
//! in the user's timezone.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::models::notification::{ChannelKind, NotificationPriority};
use crate::models::preference::{NotificationPreference, QuietHours, ScopedOverride};

/// The lookup key for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct PreferenceQuery<'a> {
    pub category: &'a str,
    pub notification_type: &'a str,
    pub channel: ChannelKind,
    pub priority: NotificationPriority,
    pub template_name: Option<&'a str>,
}

/// Evaluation outcome; Deny carries the reason surfaced in skip results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceDecision {
    Allow,
    Deny(String),
}

impl PreferenceDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PreferenceDecision::Allow)
    }
}

/// Evaluate whether a notification may be delivered.
///
/// A missing preference record allows delivery (fail-open): users who have
/// never configured preferences must not silently lose notifications.
pub fn evaluate(
    preference: Option<&NotificationPreference>,
    query: &PreferenceQuery<'_>,
    now: DateTime<Utc>,
) -> PreferenceDecision {
    let Some(pref) = preference else {
        return PreferenceDecision::Allow;
    };

    if !pref.enabled {
        return PreferenceDecision::Deny("notifications disabled".to_string());
    }

    if query.priority != NotificationPriority::Urgent
        && in_quiet_hours(&pref.quiet_hours, now)
    {
        return PreferenceDecision::Deny("quiet hours".to_string());
    }

    // Most specific override wins: template > type > category
    let scopes: [(&str, Option<&ScopedOverride>); 3] = [
        (
            "template",
            query
                .template_name
                .and_then(|name| pref.templates.get(name)),
        ),
        ("type", pref.types.get(query.notification_type)),
        ("category", pref.categories.get(query.category)),
    ];

    for (scope, entry) in scopes {
        let Some(entry) = entry else { continue };
        if let Some(&enabled) = entry.channels.get(query.channel.as_str()) {
            debug!(scope, channel = %query.channel, enabled, "channel override matched");
            return decide(enabled, || format!("{} override disables {}", scope, query.channel));
        }
        if let Some(enabled) = entry.enabled {
            debug!(scope, enabled, "scope override matched");
            return decide(enabled, || format!("{} override disabled", scope));
        }
    }

    let channel_enabled = match query.channel {
        ChannelKind::InApp => pref.channels.in_app.enabled,
        ChannelKind::Email => pref.channels.email.enabled,
        ChannelKind::Sms => pref.channels.sms.enabled,
        ChannelKind::Push => pref.channels.push.enabled,
        ChannelKind::Webhook => pref.channels.webhook.enabled,
    };
    decide(channel_enabled, || format!("{} channel disabled", query.channel))
}

fn decide(enabled: bool, reason: impl FnOnce() -> String) -> PreferenceDecision {
    if enabled {
        PreferenceDecision::Allow
    } else {
        PreferenceDecision::Deny(reason())
    }
}

/// Scoped priority override, most specific scope first. Returns None when
/// no matching scope forces a priority.
pub fn priority_override(
    preference: Option<&NotificationPreference>,
    query: &PreferenceQuery<'_>,
) -> Option<NotificationPriority> {
    let pref = preference?;
    let scopes = [
        query
            .template_name
            .and_then(|name| pref.templates.get(name)),
        pref.types.get(query.notification_type),
        pref.categories.get(query.category),
    ];
    scopes.into_iter().flatten().find_map(|entry| entry.priority)
}

/// Whether `now` falls inside the quiet-hours window [start, end),
/// evaluated in the configured timezone. Windows may wrap past midnight.
pub fn in_quiet_hours(quiet_hours: &QuietHours, now: DateTime<Utc>) -> bool {
    if !quiet_hours.enabled {
        return false;
    }
    let (Some(start), Some(end)) = (
        parse_hhmm(&quiet_hours.start),
        parse_hhmm(&quiet_hours.end),
    ) else {
        debug!(
            start = %quiet_hours.start,
            end = %quiet_hours.end,
            "unparseable quiet-hours window, ignoring"
        );
        return false;
    };

    let tz: Tz = quiet_hours.timezone.parse().unwrap_or_else(|_| {
        debug!(timezone = %quiet_hours.timezone, "unknown timezone, falling back to UTC");
        chrono_tz::UTC
    });
    let local = now.with_timezone(&tz).time();

    if start <= end {
        local >= start && local < end
    } else {
        // window wraps past midnight, e.g. 22:00 -> 08:00
        local >= start || local < end
    }
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::preference::{ChannelPreferences, SmsSettings};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn base_pref() -> NotificationPreference {
        NotificationPreference::defaults(Uuid::new_v4(), Utc::now())
    }

    fn query<'a>(channel: ChannelKind) -> PreferenceQuery<'a> {
        PreferenceQuery {
            category: "orders",
            notification_type: "order_shipped",
            channel,
            priority: NotificationPriority::Normal,
            template_name: Some("order-shipped"),
        }
    }

    fn override_for(channel: ChannelKind, enabled: bool) -> ScopedOverride {
        let mut channels = HashMap::new();
        channels.insert(channel.as_str().to_string(), enabled);
        ScopedOverride {
            enabled: None,
            channels,
            priority: None,
        }
    }

    #[test]
    fn test_missing_preference_record_allows() {
        let decision = evaluate(None, &query(ChannelKind::Email), Utc::now());
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_global_disable_denies() {
        let mut pref = base_pref();
        pref.enabled = false;
        let decision = evaluate(Some(&pref), &query(ChannelKind::InApp), Utc::now());
        assert_eq!(
            decision,
            PreferenceDecision::Deny("notifications disabled".to_string())
        );
    }

    #[test]
    fn test_channel_flag_fallback() {
        let mut pref = base_pref();
        pref.channels = ChannelPreferences {
            sms: SmsSettings {
                enabled: false,
                phone_number: Some("+254700000001".to_string()),
            },
            ..Default::default()
        };
        assert!(!evaluate(Some(&pref), &query(ChannelKind::Sms), Utc::now()).is_allowed());
        assert!(evaluate(Some(&pref), &query(ChannelKind::Email), Utc::now()).is_allowed());
    }

    #[test]
    fn test_template_override_beats_category_override() {
        let mut pref = base_pref();
        pref.categories
            .insert("orders".to_string(), override_for(ChannelKind::Email, false));
        pref.templates.insert(
            "order-shipped".to_string(),
            override_for(ChannelKind::Email, true),
        );
        assert!(evaluate(Some(&pref), &query(ChannelKind::Email), Utc::now()).is_allowed());

        // and the reverse: template-level deny wins over category-level allow
        let mut pref = base_pref();
        pref.categories
            .insert("orders".to_string(), override_for(ChannelKind::Email, true));
        pref.templates.insert(
            "order-shipped".to_string(),
            override_for(ChannelKind::Email, false),
        );
        assert!(!evaluate(Some(&pref), &query(ChannelKind::Email), Utc::now()).is_allowed());
    }

    #[test]
    fn test_type_override_beats_category_override() {
        let mut pref = base_pref();
        pref.categories
            .insert("orders".to_string(), override_for(ChannelKind::Push, true));
        pref.types.insert(
            "order_shipped".to_string(),
            override_for(ChannelKind::Push, false),
        );
        let mut q = query(ChannelKind::Push);
        q.template_name = None;
        assert!(!evaluate(Some(&pref), &q, Utc::now()).is_allowed());
    }

    #[test]
    fn test_scope_wide_enabled_applies_when_no_channel_override() {
        let mut pref = base_pref();
        pref.categories.insert(
            "orders".to_string(),
            ScopedOverride {
                enabled: Some(false),
                channels: HashMap::new(),
                priority: None,
            },
        );
        assert!(!evaluate(Some(&pref), &query(ChannelKind::InApp), Utc::now()).is_allowed());
    }

    fn quiet(start: &str, end: &str, tz: &str) -> QuietHours {
        QuietHours {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
            timezone: tz.to_string(),
        }
    }

    #[test]
    fn test_quiet_hours_suppress_normal_priority() {
        let mut pref = base_pref();
        pref.quiet_hours = quiet("22:00", "08:00", "UTC");
        let night = Utc.with_ymd_and_hms(2025, 7, 10, 23, 30, 0).unwrap();
        assert_eq!(
            evaluate(Some(&pref), &query(ChannelKind::InApp), night),
            PreferenceDecision::Deny("quiet hours".to_string())
        );
        let morning = Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap();
        assert!(evaluate(Some(&pref), &query(ChannelKind::InApp), morning).is_allowed());
    }

    #[test]
    fn test_quiet_hours_never_suppress_urgent() {
        let mut pref = base_pref();
        pref.quiet_hours = quiet("22:00", "08:00", "UTC");
        let mut q = query(ChannelKind::InApp);
        q.priority = NotificationPriority::Urgent;
        let night = Utc.with_ymd_and_hms(2025, 7, 10, 23, 30, 0).unwrap();
        assert!(evaluate(Some(&pref), &q, night).is_allowed());
    }

    #[test]
    fn test_quiet_hours_window_wraps_midnight() {
        let window = quiet("22:00", "08:00", "UTC");
        let before_midnight = Utc.with_ymd_and_hms(2025, 7, 10, 22, 0, 0).unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2025, 7, 11, 7, 59, 0).unwrap();
        let end_boundary = Utc.with_ymd_and_hms(2025, 7, 11, 8, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        assert!(in_quiet_hours(&window, before_midnight));
        assert!(in_quiet_hours(&window, after_midnight));
        // [start, end): the end minute is outside
        assert!(!in_quiet_hours(&window, end_boundary));
        assert!(!in_quiet_hours(&window, midday));
    }

    #[test]
    fn test_quiet_hours_respect_timezone() {
        // 21:00 UTC is 23:00 in Nairobi (UTC+3): inside a 22:00-06:00 window
        let window = quiet("22:00", "06:00", "Africa/Nairobi");
        let at = Utc.with_ymd_and_hms(2025, 7, 10, 21, 0, 0).unwrap();
        assert!(in_quiet_hours(&window, at));
        // but 21:00 Nairobi time (18:00 UTC) is outside
        let earlier = Utc.with_ymd_and_hms(2025, 7, 10, 18, 0, 0).unwrap();
        assert!(!in_quiet_hours(&window, earlier));
    }

    #[test]
    fn test_quiet_hours_unknown_timezone_falls_back_to_utc() {
        let window = quiet("10:00", "12:00", "Mars/Olympus_Mons");
        let inside = Utc.with_ymd_and_hms(2025, 7, 10, 11, 0, 0).unwrap();
        assert!(in_quiet_hours(&window, inside));
    }

    #[test]
    fn test_quiet_hours_disabled_window_ignored() {
        let mut window = quiet("00:00", "23:59", "UTC");
        window.enabled = false;
        assert!(!in_quiet_hours(&window, Utc::now()));
    }
}
