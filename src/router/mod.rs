//! API route assembly

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::app_state::AppState;
use crate::handlers::{channels, health, notifications, preferences, templates};
use crate::middleware;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Notification intake and delivery
        .route("/notifications", post(notifications::create_notification))
        .route("/notifications/batch", post(notifications::send_batch))
        .route("/notifications/{id}", get(notifications::get_notification))
        // Per-user surface
        .nest(
            "/users/{user_id}",
            Router::new()
                .route("/notifications", get(notifications::list_notifications))
                .route(
                    "/notifications/stream",
                    get(notifications::stream_notifications),
                )
                .route(
                    "/notifications/unread-count",
                    get(notifications::count_unread),
                )
                .route(
                    "/notifications/read-all",
                    put(notifications::mark_all_as_read),
                )
                .route("/notifications/{id}/read", put(notifications::mark_as_read))
                .route(
                    "/notifications/{id}/archive",
                    put(notifications::archive_notification),
                )
                .route(
                    "/notifications/{id}",
                    delete(notifications::delete_notification),
                )
                .route(
                    "/notification-preferences",
                    get(preferences::get_preferences)
                        .put(preferences::update_preferences)
                        .delete(preferences::reset_preferences),
                ),
        )
        // Admin surface
        .nest(
            "/admin",
            Router::new()
                .route(
                    "/notifications/process-scheduled",
                    post(notifications::process_scheduled),
                )
                .route(
                    "/notifications/process-expired",
                    post(notifications::process_expired),
                )
                .route(
                    "/channels",
                    post(channels::create_channel).get(channels::list_channels),
                )
                .route(
                    "/channels/{name}",
                    get(channels::get_channel)
                        .put(channels::update_channel)
                        .delete(channels::delete_channel),
                )
                .route("/channels/{name}/test", post(channels::test_channel))
                .route("/channels/{name}/default", post(channels::set_default_channel))
                .route("/channels/{name}/stats", get(channels::get_channel_stats))
                .route(
                    "/templates",
                    post(templates::create_template).get(templates::list_templates),
                )
                .route("/templates/{name}", get(templates::get_template)),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(
                    middleware::request_logger_middleware,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(std::time::Duration::from_secs(
                    state.config.request_timeout,
                )))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
