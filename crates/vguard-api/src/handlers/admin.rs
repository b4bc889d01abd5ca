//! Admin handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::videos::{StatusQuery, VideoListResponse};
use crate::state::AppState;

/// List every video, optionally filtered by lifecycle state.
pub async fn admin_list_videos(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<VideoListResponse>> {
    let status = query.parse()?;
    let videos = state.videos.admin_list(&user.requester(), status).await?;
    Ok(Json(VideoListResponse::from_videos(&videos)))
}

/// Processing and delivery counters for operators.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfoResponse {
    pub version: String,
    pub runs_in_flight: usize,
    pub event_listeners: usize,
    pub pending_tombstones: usize,
}

pub async fn get_system_info(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<SystemInfoResponse>> {
    if !user.is_admin() {
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(Json(SystemInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        runs_in_flight: state.orchestrator.in_flight_count(),
        event_listeners: state.broadcaster.listener_count(),
        pending_tombstones: state.tombstones.len(),
    }))
}
