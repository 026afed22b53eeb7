//! Channel registry
//!
//! Resolves a logical channel name to an initialized adapter + channel
//! configuration, lazily initializing adapters from stored configuration
//! and selecting the `default`-tagged channel (else the first active one)
//! when no name is pinned. The registry is an explicit object constructed
//! at startup and handed to the orchestrator; after the adapter reports
//! an outcome, delivery statistics are recorded through the channel store
//! as a separate step.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::store::ChannelStore;
use crate::error::ApiError;
use crate::models::channel::{ChannelConfig, ChannelStatus};
use crate::models::notification::{ChannelKind, Notification};
use crate::models::preference::DeliverySettings;

use super::channels::{ChannelAdapter, DeliveryOutcome};
use super::template::RenderedContent;

pub struct ChannelRegistry {
    channels: Arc<dyn ChannelStore>,
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
    initialized: DashMap<String, ()>,
}

impl ChannelRegistry {
    pub fn new(channels: Arc<dyn ChannelStore>) -> Self {
        Self {
            channels,
            adapters: HashMap::new(),
            initialized: DashMap::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn adapter(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Resolve the channel configuration to dispatch through: an explicit
    /// name wins, else the `default`-tagged active channel of the type,
    /// else the first active one. In-app falls back to a builtin config
    /// when none is stored.
    pub async fn resolve_channel(
        &self,
        kind: ChannelKind,
        name: Option<&str>,
    ) -> Result<ChannelConfig, ApiError> {
        if let Some(name) = name {
            let channel = self
                .channels
                .find_by_name(name)
                .await?
                .ok_or_else(|| ApiError::not_found("Channel"))?;
            if channel.channel_type.kind() != Some(kind) {
                return Err(ApiError::BadRequest(format!(
                    "channel {} is not a {} channel",
                    name, kind
                )));
            }
            return Ok(channel);
        }

        let active = self.channels.list_active_by_type(kind.into()).await?;
        if let Some(channel) = active
            .iter()
            .find(|c| c.is_default())
            .or_else(|| active.first())
        {
            return Ok(channel.clone());
        }

        if kind == ChannelKind::InApp {
            return Ok(ChannelConfig::builtin_in_app(Utc::now()));
        }
        Err(ApiError::not_found(&format!(
            "Active {} channel",
            kind
        )))
    }

    /// Initialize the adapter for a channel once per process lifetime.
    /// Failures mark the channel record `error` with the message.
    async fn ensure_initialized(
        &self,
        adapter: &Arc<dyn ChannelAdapter>,
        channel: &ChannelConfig,
    ) -> Result<(), String> {
        if self.initialized.contains_key(&channel.name) {
            return Ok(());
        }
        match adapter.initialize_channel(channel).await {
            Ok(()) => {
                self.initialized.insert(channel.name.clone(), ());
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if channel.id != Uuid::nil() {
                    if let Err(store_err) = self
                        .channels
                        .set_status(
                            &channel.name,
                            ChannelStatus::Error,
                            Some(message.clone()),
                            None,
                        )
                        .await
                    {
                        error!(
                            channel = %channel.name,
                            error = %store_err,
                            "failed to persist channel error status"
                        );
                    }
                }
                Err(message)
            }
        }
    }

    /// Dispatch one notification. Never errors: every failure becomes a
    /// structured outcome the orchestrator can persist.
    pub async fn dispatch(
        &self,
        notification: &Notification,
        content: &RenderedContent,
        settings: &DeliverySettings,
        channel_name: Option<&str>,
    ) -> DeliveryOutcome {
        let kind = notification.channel;
        let Some(adapter) = self.adapter(kind) else {
            return DeliveryOutcome::failed(format!("no adapter registered for {}", kind));
        };

        let channel = match self.resolve_channel(kind, channel_name).await {
            Ok(channel) => channel,
            Err(e) => return DeliveryOutcome::failed(e.to_string()),
        };

        if let Err(message) = self.ensure_initialized(&adapter, &channel).await {
            let outcome = DeliveryOutcome::failed(message);
            self.record_attempt(&channel, &outcome).await;
            return outcome;
        }

        let outcome = adapter.send(notification, content, settings, &channel).await;
        self.record_attempt(&channel, &outcome).await;
        outcome
    }

    /// Statistics are updated after the outcome comes back, decoupled
    /// from the transport path. Queued outcomes are not attempts.
    async fn record_attempt(&self, channel: &ChannelConfig, outcome: &DeliveryOutcome) {
        if outcome.queued || channel.id == Uuid::nil() {
            return;
        }
        if let Err(e) = self
            .channels
            .record_attempt(&channel.name, outcome.success, outcome.delivered, Utc::now())
            .await
        {
            warn!(channel = %channel.name, error = %e, "failed to record delivery attempt");
        }
    }

    /// Drop cached initialization state so the next use rebuilds the
    /// provider client from fresh configuration
    pub fn invalidate(&self, name: &str) {
        self.initialized.remove(name);
    }

    /// Initialize the channel's adapter and write the result back to the
    /// channel record: `active` on success, `error` with the message on
    /// failure. Returns the updated record.
    pub async fn test_channel(&self, name: &str) -> Result<ChannelConfig, ApiError> {
        let channel = self
            .channels
            .find_by_name(name)
            .await?
            .ok_or_else(|| ApiError::not_found("Channel"))?;

        let now = Utc::now();
        let result = match channel.channel_type.kind().and_then(|k| self.adapter(k)) {
            Some(adapter) => {
                self.invalidate(name);
                adapter.initialize_channel(&channel).await
            }
            None => {
                return Err(ApiError::BadRequest(format!(
                    "channel type {} cannot be tested",
                    channel.channel_type
                )));
            }
        };

        match result {
            Ok(()) => {
                self.initialized.insert(name.to_string(), ());
                self.channels
                    .set_status(name, ChannelStatus::Active, None, Some(now))
                    .await?;
                info!(channel = %name, "channel test succeeded");
            }
            Err(e) => {
                self.channels
                    .set_status(name, ChannelStatus::Error, Some(e.to_string()), Some(now))
                    .await?;
                warn!(channel = %name, error = %e, "channel test failed");
            }
        }

        self.channels
            .find_by_name(name)
            .await?
            .ok_or_else(|| ApiError::not_found("Channel"))
    }
}
