//! Liveness and readiness endpoints.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tokio::time::{timeout, Instant};

use crate::state::AppState;

/// Upper bound on a single dependency check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// The process is up and serving; dependencies are not consulted.
pub async fn health(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        status: "alive",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCheck {
    pub component: &'static str,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub ready: bool,
    pub components: Vec<ComponentCheck>,
    pub runs_in_flight: usize,
    pub pending_deletes: usize,
}

/// Run one dependency check under [`CHECK_TIMEOUT`].
pub async fn check_component<F, E>(component: &'static str, check: F) -> ComponentCheck
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let start = Instant::now();
    let error = match timeout(CHECK_TIMEOUT, check).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("no answer within {}s", CHECK_TIMEOUT.as_secs())),
    };
    ComponentCheck {
        component,
        healthy: error.is_none(),
        latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        error,
    }
}

/// Ready when both the metadata repository and the video store answer.
/// Replies 503 with the same body otherwise.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let (repository, store) = tokio::join!(
        check_component("metadata", state.repository.check_connectivity()),
        check_component("video_store", state.store.check_connectivity()),
    );
    let components = vec![repository, store];
    let ready = components.iter().all(|c| c.healthy);

    if !ready {
        tracing::warn!(
            failing = ?components
                .iter()
                .filter(|c| !c.healthy)
                .map(|c| c.component)
                .collect::<Vec<_>>(),
            "Readiness check failed"
        );
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(Readiness {
            ready,
            components,
            runs_in_flight: state.orchestrator.in_flight_count(),
            pending_deletes: state.tombstones.len(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_check_carries_error() {
        let check = check_component("video_store", async { Err::<(), _>("disk unmounted") }).await;
        assert!(!check.healthy);
        assert_eq!(check.error.as_deref(), Some("disk unmounted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_check_times_out() {
        let check =
            check_component("metadata", std::future::pending::<Result<(), String>>()).await;
        assert!(!check.healthy);
        assert!(check.error.unwrap().contains("no answer"));
        assert!(check.latency_ms >= CHECK_TIMEOUT.as_millis() as u64);
    }
}
