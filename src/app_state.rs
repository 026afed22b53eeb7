//! Application state shared across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::database::store::{ChannelStore, PreferenceStore, TemplateStore};
use crate::services::channels::InAppAdapter;
use crate::services::orchestrator::NotificationOrchestrator;
use crate::services::registry::ChannelRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Config,
    /// Delivery orchestrator (create-and-send, sweeps, read surface)
    pub orchestrator: NotificationOrchestrator,
    /// Channel registry for admin test/invalidate operations
    pub registry: Arc<ChannelRegistry>,
    /// Channel configuration store (admin surface)
    pub channels: Arc<dyn ChannelStore>,
    /// Template store (admin surface)
    pub templates: Arc<dyn TemplateStore>,
    /// Preference store (user surface)
    pub preferences: Arc<dyn PreferenceStore>,
    /// In-app adapter, for WebSocket stream subscriptions
    pub in_app: Arc<InAppAdapter>,
    /// Prometheus exposition handle
    pub metrics_handle: PrometheusHandle,
}
