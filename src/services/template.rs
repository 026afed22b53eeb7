//! Template rendering
//!
//! Pure functions: template + variables + target channel -> rendered
//! content. Substitution is literal `{{name}}` replacement; unresolved
//! tokens pass through verbatim (lenient by design, see
//! `validate_variables` for the advisory check). Webhook payload shapes
//! are substituted by structural recursion over the JSON tree.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::notification::{
    ChannelKind, Notification, NotificationAction, NotificationPriority,
};
use crate::models::template::NotificationTemplate;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("valid token regex"));

/// Rendered email content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedEmail {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    pub text_body: String,
}

/// Rendered SMS content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedSms {
    pub text: String,
}

/// Rendered push content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPush {
    pub title: String,
    pub body: String,
}

/// Channel-ready notification content. Exactly one channel-specific
/// sub-object is populated, matching the channel the render targeted.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedContent {
    pub title: String,
    pub message: String,
    pub actions: Vec<NotificationAction>,
    pub notification_type: String,
    pub category: String,
    pub priority: NotificationPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<RenderedEmail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<RenderedSms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<RenderedPush>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<serde_json::Value>,
}

impl RenderedContent {
    /// Build content from literal title/message (template-less sends)
    pub fn literal(
        title: &str,
        message: &str,
        actions: Vec<NotificationAction>,
        notification_type: &str,
        category: &str,
        priority: NotificationPriority,
        channel: ChannelKind,
    ) -> Self {
        let mut content = Self {
            title: title.to_string(),
            message: message.to_string(),
            actions,
            notification_type: notification_type.to_string(),
            category: category.to_string(),
            priority,
            email: None,
            sms: None,
            push: None,
            webhook: None,
        };
        content.fill_channel_defaults(channel);
        content
    }

    /// Rebuild content from a persisted notification. Channel sub-content
    /// stored under `data[channel]` at intake wins; title/message are the
    /// fallback.
    pub fn from_notification(n: &Notification) -> Self {
        let mut content = Self {
            title: n.title.clone(),
            message: n.message.clone(),
            actions: n.actions.clone(),
            notification_type: n.notification_type.clone(),
            category: n.category.clone(),
            priority: n.priority,
            email: None,
            sms: None,
            push: None,
            webhook: None,
        };
        let stored = n.data.get(n.channel.as_str());
        match n.channel {
            ChannelKind::Email => {
                content.email = stored
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
            }
            ChannelKind::Sms => {
                content.sms = stored
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
            }
            ChannelKind::Push => {
                content.push = stored
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
            }
            ChannelKind::Webhook => {
                content.webhook = stored.cloned();
            }
            ChannelKind::InApp => {}
        }
        content.fill_channel_defaults(n.channel);
        content
    }

    /// The channel sub-content as JSON, for persisting under `data[channel]`
    pub fn channel_payload(&self, channel: ChannelKind) -> Option<serde_json::Value> {
        match channel {
            ChannelKind::Email => self.email.as_ref().and_then(|c| serde_json::to_value(c).ok()),
            ChannelKind::Sms => self.sms.as_ref().and_then(|c| serde_json::to_value(c).ok()),
            ChannelKind::Push => self.push.as_ref().and_then(|c| serde_json::to_value(c).ok()),
            ChannelKind::Webhook => self.webhook.clone(),
            ChannelKind::InApp => None,
        }
    }

    /// Populate the requested channel's sub-object from title/message when
    /// it is still empty
    fn fill_channel_defaults(&mut self, channel: ChannelKind) {
        match channel {
            ChannelKind::Email if self.email.is_none() => {
                self.email = Some(RenderedEmail {
                    subject: self.title.clone(),
                    html_body: None,
                    text_body: self.message.clone(),
                });
            }
            ChannelKind::Sms if self.sms.is_none() => {
                self.sms = Some(RenderedSms {
                    text: self.message.clone(),
                });
            }
            ChannelKind::Push if self.push.is_none() => {
                self.push = Some(RenderedPush {
                    title: self.title.clone(),
                    body: self.message.clone(),
                });
            }
            _ => {}
        }
    }
}

/// Advisory variable check result
#[derive(Debug, Clone, Serialize)]
pub struct VariableValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check that every required template variable is supplied. Advisory:
/// callers decide whether to abort on invalid input.
pub fn validate_variables(
    template: &NotificationTemplate,
    variables: &serde_json::Value,
) -> VariableValidation {
    let mut errors = Vec::new();
    for var in &template.variables {
        if !var.required || var.default_value.is_some() {
            continue;
        }
        let supplied = variables
            .get(&var.name)
            .is_some_and(|v| !v.is_null());
        if !supplied {
            errors.push(format!("missing required variable: {}", var.name));
        }
    }
    VariableValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Render a template for one channel.
pub fn render(
    template: &NotificationTemplate,
    variables: &serde_json::Value,
    channel: ChannelKind,
) -> RenderedContent {
    let vars = collect_variables(template, variables);

    let title = substitute(&template.title_template, &vars);
    let message = substitute(&template.message_template, &vars);

    let actions = template
        .actions
        .iter()
        .map(|a| NotificationAction {
            url: substitute(&a.url, &vars),
            ..a.clone()
        })
        .collect();

    let mut content = RenderedContent {
        title,
        message,
        actions,
        notification_type: template.notification_type.clone(),
        category: template.category.clone(),
        priority: template.default_priority,
        email: None,
        sms: None,
        push: None,
        webhook: None,
    };

    match channel {
        ChannelKind::Email => {
            if let Some(email) = &template.channels.email {
                content.email = Some(RenderedEmail {
                    subject: substitute(&email.subject, &vars),
                    html_body: email.html_template.as_deref().map(|t| substitute(t, &vars)),
                    text_body: email
                        .text_template
                        .as_deref()
                        .map(|t| substitute(t, &vars))
                        .unwrap_or_else(|| content.message.clone()),
                });
            }
        }
        ChannelKind::Sms => {
            if let Some(sms) = &template.channels.sms {
                content.sms = Some(RenderedSms {
                    text: substitute(&sms.text_template, &vars),
                });
            }
        }
        ChannelKind::Push => {
            if let Some(push) = &template.channels.push {
                content.push = Some(RenderedPush {
                    title: substitute(&push.title_template, &vars),
                    body: substitute(&push.body_template, &vars),
                });
            }
        }
        ChannelKind::Webhook => {
            if let Some(shape) = &template.channels.webhook {
                content.webhook = Some(substitute_tree(shape, &vars));
            }
        }
        ChannelKind::InApp => {}
    }
    content.fill_channel_defaults(channel);
    content
}

/// Declared defaults overlaid by caller-supplied values
fn collect_variables(
    template: &NotificationTemplate,
    variables: &serde_json::Value,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for var in &template.variables {
        if let Some(default) = &var.default_value {
            if let Some(s) = value_to_string(default) {
                vars.insert(var.name.clone(), s);
            }
        }
    }
    if let Some(map) = variables.as_object() {
        for (name, value) in map {
            if let Some(s) = value_to_string(value) {
                vars.insert(name.clone(), s);
            }
        }
    }
    vars
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

/// Literal `{{name}}` substitution; unknown tokens are kept verbatim
fn substitute(input: &str, vars: &HashMap<String, String>) -> String {
    TOKEN_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Structural recursion over a JSON payload shape: only string leaves are
/// substituted; arrays and objects are walked, other leaves pass through.
fn substitute_tree(value: &serde_json::Value, vars: &HashMap<String, String>) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(substitute(s, vars)),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|item| substitute_tree(item, vars)).collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_tree(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template::{
        EmailTemplateContent, TemplateChannelContent, TemplateVariable,
    };
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn welcome_template() -> NotificationTemplate {
        NotificationTemplate {
            id: Uuid::new_v4(),
            name: "welcome".to_string(),
            display_name: "Welcome".to_string(),
            description: None,
            notification_type: "account_created".to_string(),
            category: "account".to_string(),
            title_template: "Welcome to FarmLink, {{name}}!".to_string(),
            message_template: "Hi {{name}}, your {{plan}} account is ready.".to_string(),
            default_priority: NotificationPriority::Normal,
            channels: TemplateChannelContent {
                email: Some(EmailTemplateContent {
                    subject: "Welcome aboard, {{name}}".to_string(),
                    html_template: Some("<p>Hello {{name}}</p>".to_string()),
                    text_template: None,
                }),
                ..Default::default()
            },
            actions: vec![NotificationAction {
                name: "open".to_string(),
                text: "Open dashboard".to_string(),
                url: "https://app.farmlink.example/u/{{name}}".to_string(),
                icon: None,
                primary: true,
            }],
            variables: vec![
                TemplateVariable {
                    name: "name".to_string(),
                    required: true,
                    default_value: None,
                    example: Some(json!("Asha")),
                },
                TemplateVariable {
                    name: "plan".to_string(),
                    required: false,
                    default_value: Some(json!("standard")),
                    example: None,
                },
            ],
            is_active: true,
            version: 1,
            previous_version: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_substitutes_all_supplied_variables() {
        let template = welcome_template();
        let content = render(&template, &json!({"name": "Asha"}), ChannelKind::Email);

        assert_eq!(content.title, "Welcome to FarmLink, Asha!");
        assert_eq!(content.message, "Hi Asha, your standard account is ready.");
        assert!(!content.title.contains("{{"));
        assert!(!content.message.contains("{{"));

        let email = content.email.expect("email content for email channel");
        assert_eq!(email.subject, "Welcome aboard, Asha");
        assert_eq!(email.html_body.as_deref(), Some("<p>Hello Asha</p>"));
        // no text override: falls back to rendered message
        assert_eq!(email.text_body, "Hi Asha, your standard account is ready.");

        assert_eq!(content.actions[0].url, "https://app.farmlink.example/u/Asha");
    }

    #[test]
    fn test_render_leaves_unresolved_tokens_verbatim() {
        let template = welcome_template();
        let content = render(&template, &json!({}), ChannelKind::InApp);
        assert_eq!(content.title, "Welcome to FarmLink, {{name}}!");
        // the defaulted variable is still substituted
        assert!(content.message.contains("standard"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let template = welcome_template();
        let vars = json!({"name": "Asha"});
        let first = render(&template, &vars, ChannelKind::Email);
        let second = render(&template, &vars, ChannelKind::Email);
        assert_eq!(first.title, second.title);
        assert_eq!(first.message, second.message);
        assert_eq!(first.email, second.email);
    }

    #[test]
    fn test_render_only_requested_channel_is_populated() {
        let template = welcome_template();
        let content = render(&template, &json!({"name": "A"}), ChannelKind::Sms);
        assert!(content.email.is_none());
        assert!(content.push.is_none());
        assert!(content.webhook.is_none());
        // no sms override: falls back to the rendered message
        assert_eq!(content.sms.unwrap().text, "Hi A, your standard account is ready.");
    }

    #[test]
    fn test_validate_variables_reports_missing_required() {
        let template = welcome_template();
        let result = validate_variables(&template, &json!({}));
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["missing required variable: name"]);

        let ok = validate_variables(&template, &json!({"name": "Asha"}));
        assert!(ok.valid);
        assert!(ok.errors.is_empty());
    }

    #[test]
    fn test_webhook_tree_substitution() {
        let mut template = welcome_template();
        template.channels.webhook = Some(json!({
            "event": "user.{{name}}",
            "nested": {"greeting": "hello {{name}}", "count": 3},
            "list": [["{{name}}", "{{unknown}}"], {"deep": "{{plan}}"}],
            "flag": true
        }));
        let content = render(&template, &json!({"name": "asha"}), ChannelKind::Webhook);
        let payload = content.webhook.unwrap();
        assert_eq!(payload["event"], "user.asha");
        assert_eq!(payload["nested"]["greeting"], "hello asha");
        assert_eq!(payload["nested"]["count"], 3);
        assert_eq!(payload["list"][0][0], "asha");
        // unknown token survives verbatim
        assert_eq!(payload["list"][0][1], "{{unknown}}");
        assert_eq!(payload["list"][1]["deep"], "standard");
        assert_eq!(payload["flag"], true);
    }

    #[test]
    fn test_numeric_and_bool_variables() {
        let mut vars = HashMap::new();
        vars.insert("count".to_string(), "7".to_string());
        assert_eq!(substitute("{{count}} items", &vars), "7 items");

        let template = welcome_template();
        let content = render(
            &template,
            &json!({"name": 42, "plan": true}),
            ChannelKind::InApp,
        );
        assert_eq!(content.title, "Welcome to FarmLink, 42!");
        assert!(content.message.contains("true"));
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Asha".to_string());
        assert_eq!(substitute("hi {{ name }}", &vars), "hi Asha");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Re-rendering rendered output with the same variables must not
            // change it once every token is resolved
            #[test]
            fn render_idempotent_under_resubstitution(name in "[a-zA-Z]{1,12}") {
                let mut vars = HashMap::new();
                vars.insert("name".to_string(), name);
                let once = substitute("Hello {{name}}, welcome!", &vars);
                let twice = substitute(&once, &vars);
                prop_assert_eq!(once, twice);
            }

            // Inputs without tokens always pass through untouched
            #[test]
            fn plain_text_unchanged(input in "[a-zA-Z0-9 .,!?-]{0,64}") {
                let vars = HashMap::new();
                prop_assert_eq!(substitute(&input, &vars), input);
            }
        }
    }
}
