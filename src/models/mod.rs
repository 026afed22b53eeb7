// Data model for the notification delivery core:
// notifications, templates, preferences, channel configuration.

pub mod channel;
pub mod notification;
pub mod preference;
pub mod template;

use thiserror::Error;

/// Error returned when parsing an enum from its wire representation
#[derive(Debug, Clone, Error)]
#[error("unknown value: {0}")]
pub struct ParseEnumError(pub String);
