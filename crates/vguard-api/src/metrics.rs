//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vguard_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vguard_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vguard_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "vguard_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "vguard_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "vguard_ws_messages_sent_total";
    pub const WS_MESSAGES_RECEIVED: &str = "vguard_ws_messages_received_total";

    // Video metrics
    pub const UPLOADS_TOTAL: &str = "vguard_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "vguard_upload_bytes_total";
    pub const STREAM_RESPONSES_TOTAL: &str = "vguard_stream_responses_total";
    pub const STREAM_BYTES_SERVED: &str = "vguard_stream_bytes_served_total";
    pub const VIDEOS_DELETED_TOTAL: &str = "vguard_videos_deleted_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vguard_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record WebSocket message sent.
pub fn record_ws_message_sent(message_type: &str) {
    let labels = [("type", message_type.to_string())];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Record WebSocket message received.
pub fn record_ws_message_received() {
    counter!(names::WS_MESSAGES_RECEIVED).increment(1);
}

/// Record an upload attempt by outcome (`accepted`, `rejected`, `failed`).
pub fn record_upload(outcome: &str, bytes: u64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    if bytes > 0 {
        counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
    }
}

/// Record a stream response by kind (`full`, `partial`) and bytes promised.
pub fn record_stream(kind: &str, bytes: u64) {
    let labels = [("kind", kind.to_string())];
    counter!(names::STREAM_RESPONSES_TOTAL, &labels).increment(1);
    counter!(names::STREAM_BYTES_SERVED, &labels).increment(bytes);
}

/// Record a delete by outcome (`complete`, `tombstoned`).
pub fn record_video_deleted(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::VIDEOS_DELETED_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static UUID_SEGMENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok()
});

static VIDEO_SEGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/videos/[a-zA-Z0-9_-]+").ok());

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let mut path = path.to_string();
    // Normalize video IDs (alphanumeric strings after /videos/)
    if let Some(re) = VIDEO_SEGMENT.as_ref() {
        path = re
            .replace_all(&path, |caps: &regex_lite::Captures<'_>| {
                if &caps[0] == "/videos/upload" {
                    caps[0].to_string()
                } else {
                    "/videos/:video_id".to_string()
                }
            })
            .into_owned();
    }
    if let Some(re) = UUID_SEGMENT.as_ref() {
        path = re.replace_all(&path, ":id").into_owned();
    }
    path
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/videos/abc123-def456/stream"),
            "/api/videos/:video_id/stream"
        );
        assert_eq!(
            sanitize_path("/api/videos/550e8400-e29b-41d4-a716-446655440000"),
            "/api/videos/:video_id"
        );
        assert_eq!(sanitize_path("/api/videos/upload"), "/api/videos/upload");
    }
}
