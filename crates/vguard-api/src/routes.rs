//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::admin::{admin_list_videos, get_system_info};
use crate::handlers::videos::{
    delete_video, get_video, list_videos, process_video, rename_video, requeue_video,
    stream_video, upload_video,
};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;
use crate::ws::ws_events;

/// Room for multipart boundaries and the title field on top of the file.
const UPLOAD_ENVELOPE_BYTES: u64 = 64 * 1024;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Uploads are streamed; the store enforces the exact size cap
    let upload_limit =
        usize::try_from(state.config.max_upload_bytes.saturating_add(UPLOAD_ENVELOPE_BYTES))
            .unwrap_or(usize::MAX);
    let upload_routes = Router::new()
        .route("/videos/upload", post(upload_video))
        .layer(DefaultBodyLimit::max(upload_limit));

    let video_routes = Router::new()
        .route("/videos", get(list_videos))
        .route(
            "/videos/:video_id",
            get(get_video).patch(rename_video).delete(delete_video),
        )
        .route("/videos/:video_id/process", post(process_video))
        .route("/videos/:video_id/requeue", post(requeue_video))
        .route("/videos/:video_id/stream", get(stream_video));

    let admin_routes = Router::new()
        .route("/admin/videos", get(admin_list_videos))
        .route("/admin/system", get(get_system_info));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    // SECURITY: body size limit everywhere except the streamed upload
    let bounded_routes = Router::new()
        .merge(video_routes)
        .merge(admin_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(bounded_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let ws_routes = Router::new().route("/ws/events", get(ws_events));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
