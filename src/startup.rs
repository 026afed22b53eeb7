//! Application startup and initialization logic.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::app_state::AppState;
use crate::config::Config;
use crate::database;
use crate::database::postgres::{
    PgChannelStore, PgNotificationStore, PgPreferenceStore, PgTemplateStore,
};
use crate::database::store::{ChannelStore, NotificationStore, PreferenceStore, TemplateStore};
use crate::services::channels::{
    EmailAdapter, InAppAdapter, PushAdapter, SmsAdapter, WebhookAdapter,
};
use crate::services::orchestrator::NotificationOrchestrator;
use crate::services::registry::ChannelRegistry;

/// Initialize application services and create the AppState.
pub async fn initialize_app(config: &Config) -> Result<AppState> {
    // Initialize Prometheus metrics exporter
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    info!("✅ Prometheus metrics initialized");

    // Setup database connection
    let db_pool = database::setup_database(&config.database_url).await?;

    // Run database migrations
    database::run_migrations(&db_pool).await?;

    // Record stores
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(PgNotificationStore::new(db_pool.clone()));
    let templates: Arc<dyn TemplateStore> = Arc::new(PgTemplateStore::new(db_pool.clone()));
    let preferences: Arc<dyn PreferenceStore> = Arc::new(PgPreferenceStore::new(db_pool.clone()));
    let channels: Arc<dyn ChannelStore> = Arc::new(PgChannelStore::new(db_pool));
    info!("✅ Record stores initialized");

    // Channel adapters; the in-app adapter also feeds the WebSocket stream
    let in_app = Arc::new(InAppAdapter::new(config.dispatch.in_app_stream_capacity));
    let registry = Arc::new(
        ChannelRegistry::new(channels.clone())
            .with_adapter(in_app.clone())
            .with_adapter(Arc::new(EmailAdapter::new()))
            .with_adapter(Arc::new(SmsAdapter::new()))
            .with_adapter(Arc::new(PushAdapter::new()))
            .with_adapter(Arc::new(WebhookAdapter::new())),
    );
    info!("✅ Channel registry initialized");

    let orchestrator = NotificationOrchestrator::new(
        notifications,
        templates.clone(),
        preferences.clone(),
        registry.clone(),
    );
    info!("✅ Notification orchestrator initialized");

    Ok(AppState {
        config: config.clone(),
        orchestrator,
        registry,
        channels,
        templates,
        preferences,
        in_app,
        metrics_handle,
    })
}

/// Spawn the scheduled-dispatch and expiry-archive sweep loops.
pub fn spawn_sweep_loops(state: &AppState) {
    let dispatch = state.config.dispatch.clone();

    let orchestrator = state.orchestrator.clone();
    let interval = std::time::Duration::from_secs(dispatch.scheduled_sweep_interval_secs);
    let batch = dispatch.sweep_batch_size;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = orchestrator.process_scheduled(batch).await {
                tracing::error!(error = %e, "scheduled notification sweep failed");
            }
        }
    });

    let orchestrator = state.orchestrator.clone();
    let interval = std::time::Duration::from_secs(dispatch.expiry_sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = orchestrator.process_expired(batch).await {
                tracing::error!(error = %e, "expired notification sweep failed");
            }
        }
    });

    info!(
        scheduled_interval_secs = dispatch.scheduled_sweep_interval_secs,
        expiry_interval_secs = dispatch.expiry_sweep_interval_secs,
        "🚀 Background sweep loops started"
    );
}
