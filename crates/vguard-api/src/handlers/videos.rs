//! Video API handlers.

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use vguard_models::{LifecycleState, SafetyVerdict, Video, VideoId};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::is_valid_video_id;
use crate::services::{DeleteOutcome, ProcessingTrigger, RenameRequest, UploadRequest};
use crate::state::AppState;

// ============================================================================
// Responses
// ============================================================================

/// Video as returned to clients.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub id: String,
    pub owner_id: String,
    pub display_name: String,
    pub original_filename: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
    /// Undetermined until the current run finishes
    pub safety_verdict: SafetyVerdict,
    /// Present only while processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    /// Caution-set labels matched on a streamable video
    pub advisory: bool,
    pub matched_labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub run_seq: u64,
    pub streamable: bool,
}

impl From<&Video> for VideoResponse {
    fn from(video: &Video) -> Self {
        let verdict = video.current_verdict();
        Self {
            id: video.id.to_string(),
            owner_id: video.owner_id.clone(),
            display_name: video.display_name.clone(),
            original_filename: video.original_filename.clone(),
            size_bytes: video.size_bytes,
            content_type: video.content_type().to_string(),
            uploaded_at: video.uploaded_at,
            updated_at: video.updated_at,
            lifecycle_state: video.lifecycle_state,
            safety_verdict: verdict
                .map(|v| v.verdict)
                .unwrap_or(SafetyVerdict::Undetermined),
            progress_percent: video.visible_progress(),
            advisory: video.has_advisory(),
            matched_labels: verdict.map(|v| v.matched_labels.clone()).unwrap_or_default(),
            failure_reason: video.failure_reason.clone(),
            run_seq: video.run_seq,
            streamable: video.is_streamable(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListResponse {
    pub videos: Vec<VideoResponse>,
    pub count: usize,
}

impl VideoListResponse {
    pub fn from_videos(videos: &[Video]) -> Self {
        Self {
            videos: videos.iter().map(VideoResponse::from).collect(),
            count: videos.len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResponse {
    pub video_id: String,
    pub run_seq: u64,
    pub already_processing: bool,
}

impl From<ProcessingTrigger> for ProcessingResponse {
    fn from(trigger: ProcessingTrigger) -> Self {
        Self {
            video_id: trigger.video_id.to_string(),
            run_seq: trigger.run_seq,
            already_processing: trigger.already_processing,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVideoResponse {
    pub success: bool,
    pub video_id: String,
    /// Record removal is still pending
    pub pending: bool,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

impl StatusQuery {
    pub fn parse(&self) -> ApiResult<Option<LifecycleState>> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<LifecycleState>()
                    .map_err(|_| ApiError::bad_request(format!("Unknown status '{}'", s)))
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameVideoRequest {
    pub display_name: Option<String>,
    pub original_filename: Option<String>,
}

fn parse_video_id(raw: &str) -> ApiResult<VideoId> {
    if !is_valid_video_id(raw) {
        return Err(ApiError::bad_request("Invalid video ID"));
    }
    Ok(VideoId::from(raw))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Multipart upload: a `title` field followed by a `file` field.
///
/// The file is streamed into the store as it arrives.
pub async fn upload_video(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<VideoResponse>)> {
    let requester = user.requester();
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => {
                title = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("file") => {
                let display_name = title
                    .take()
                    .ok_or_else(|| ApiError::validation("The title field must precede the file"))?;
                let original_filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::validation("The file field needs a filename"))?;
                let content_type = field.content_type().map(str::to_string);
                let body = field
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.body_text()))
                    .boxed();

                let video = state
                    .videos
                    .ingest(
                        &requester,
                        UploadRequest {
                            display_name,
                            original_filename,
                            content_type,
                            body,
                        },
                    )
                    .await?;
                return Ok((StatusCode::CREATED, Json(VideoResponse::from(&video))));
            }
            _ => {}
        }
    }

    Err(ApiError::validation("Missing file field"))
}

/// List the caller's own videos.
pub async fn list_videos(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<VideoListResponse>> {
    let status = query.parse()?;
    let videos = state.videos.list(&user.requester(), status).await?;
    Ok(Json(VideoListResponse::from_videos(&videos)))
}

pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<VideoResponse>> {
    let video_id = parse_video_id(&video_id)?;
    let video = state.videos.get(&user.requester(), &video_id).await?;
    Ok(Json(VideoResponse::from(&video)))
}

pub async fn rename_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    user: AuthUser,
    Json(request): Json<RenameVideoRequest>,
) -> ApiResult<Json<VideoResponse>> {
    let video_id = parse_video_id(&video_id)?;
    let video = state
        .videos
        .rename(
            &user.requester(),
            &video_id,
            RenameRequest {
                display_name: request.display_name,
                original_filename: request.original_filename,
            },
        )
        .await?;
    Ok(Json(VideoResponse::from(&video)))
}

pub async fn delete_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<DeleteVideoResponse>> {
    let video_id = parse_video_id(&video_id)?;
    let outcome = state.videos.delete(&user.requester(), &video_id).await?;
    Ok(Json(DeleteVideoResponse {
        success: true,
        video_id: video_id.to_string(),
        pending: outcome == DeleteOutcome::Tombstoned,
    }))
}

/// Trigger processing. A duplicate trigger is accepted and reported.
pub async fn process_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    user: AuthUser,
) -> ApiResult<(StatusCode, Json<ProcessingResponse>)> {
    let video_id = parse_video_id(&video_id)?;
    let trigger = state
        .videos
        .start_processing(&user.requester(), &video_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(trigger.into())))
}

pub async fn requeue_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    user: AuthUser,
) -> ApiResult<(StatusCode, Json<ProcessingResponse>)> {
    let video_id = parse_video_id(&video_id)?;
    let trigger = state.videos.requeue(&user.requester(), &video_id).await?;
    Ok((StatusCode::ACCEPTED, Json(trigger.into())))
}

/// Stream video bytes, honoring a single `Range`.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    let range_header = headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default());

    let stream = state
        .streaming
        .open(&user.requester(), &video_id, range_header)
        .await?;

    let content_length = stream.content_length();
    let mut response_builder = Response::builder()
        .header(header::CONTENT_TYPE, stream.content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .header("Cross-Origin-Resource-Policy", "cross-origin");

    if let Some(content_range) = stream.content_range() {
        metrics::record_stream("partial", content_length);
        response_builder = response_builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, content_range);
    } else {
        metrics::record_stream("full", content_length);
        response_builder = response_builder.status(StatusCode::OK);
    }

    response_builder
        .body(Body::from_stream(stream.body))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
