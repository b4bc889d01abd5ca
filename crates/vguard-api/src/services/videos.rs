//! Video operations: upload intake, reads, rename, delete, processing triggers.
//!
//! Everything here is plain async Rust over the repository, store and
//! orchestrator; the axum handlers only translate requests and responses.

use std::sync::Arc;

use tracing::{info, warn};

use vguard_metadata::VideoRepository;
use vguard_models::{LifecycleState, Requester, Video, VideoId, VideoUpdate};
use vguard_storage::{StorageError, UploadStream, VideoStore};
use vguard_worker::{Orchestrator, OrchestratorError, Tombstones};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::{
    is_safe_key_segment, sanitize_filename, validate_display_name, validate_video_file,
};

/// One upload as handed over by the transport layer.
pub struct UploadRequest<'a> {
    pub display_name: String,
    pub original_filename: String,
    /// MIME type declared by the client, if any
    pub content_type: Option<String>,
    pub body: UploadStream<'a>,
}

/// Fields a rename may change.
#[derive(Debug, Clone, Default)]
pub struct RenameRequest {
    pub display_name: Option<String>,
    pub original_filename: Option<String>,
}

/// Result of a processing trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingTrigger {
    pub video_id: VideoId,
    pub run_seq: u64,
    /// A run was already in flight; nothing new was scheduled
    pub already_processing: bool,
}

/// How far a delete got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Bytes and record are both gone
    Complete,
    /// Bytes are gone; the record delete is pending in the sweeper
    Tombstoned,
}

/// Video operations shared by the HTTP handlers.
#[derive(Clone)]
pub struct VideoService {
    repository: Arc<dyn VideoRepository>,
    store: Arc<dyn VideoStore>,
    orchestrator: Orchestrator,
    tombstones: Arc<Tombstones>,
    max_upload_bytes: u64,
}

impl VideoService {
    pub fn new(
        repository: Arc<dyn VideoRepository>,
        store: Arc<dyn VideoStore>,
        orchestrator: Orchestrator,
        tombstones: Arc<Tombstones>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            repository,
            store,
            orchestrator,
            tombstones,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Store an upload, create its `Pending` record and trigger processing.
    ///
    /// The returned record reflects the state at creation; processing runs
    /// in the background.
    pub async fn ingest(&self, requester: &Requester, upload: UploadRequest<'_>) -> ApiResult<Video> {
        if !requester.role.can_upload() {
            return Err(ApiError::forbidden("Uploading requires the editor role"));
        }

        let display_name = validate_display_name(&upload.display_name).map_err(ApiError::Validation)?;
        let original_filename = sanitize_filename(&upload.original_filename);
        let ext = validate_video_file(&original_filename, upload.content_type.as_deref())
            .map_err(ApiError::Validation)?;
        if !is_safe_key_segment(&requester.user_id) {
            return Err(ApiError::bad_request("User id cannot be used in a storage key"));
        }

        let video_id = VideoId::new();
        let storage_key = format!("{}/{}.{}", requester.user_id, video_id, ext);

        let size = match self
            .store
            .put(&storage_key, upload.body, self.max_upload_bytes)
            .await
        {
            Ok(size) => size,
            Err(e) => {
                let outcome = if matches!(e, StorageError::TooLarge { .. }) {
                    "rejected"
                } else {
                    "failed"
                };
                metrics::record_upload(outcome, 0);
                warn!(owner_id = %requester.user_id, key = %storage_key, "Upload not stored: {}", e);
                return Err(e.into());
            }
        };

        let video = Video::new(
            video_id.clone(),
            requester.user_id.clone(),
            storage_key.clone(),
            display_name,
            original_filename,
            size,
        );

        if let Err(e) = self.repository.create(video.clone()).await {
            // Leave nothing behind; the sweeper catches it if this fails too
            if let Err(cleanup) = self.store.delete(&storage_key).await {
                warn!(key = %storage_key, "Failed to remove bytes of unrecorded upload: {}", cleanup);
            }
            metrics::record_upload("failed", 0);
            return Err(e.into());
        }

        metrics::record_upload("accepted", size);
        info!(
            video_id = %video_id,
            owner_id = %requester.user_id,
            size_bytes = size,
            "Video uploaded"
        );

        match self.orchestrator.start_processing(&video_id).await {
            Ok(_) => {}
            Err(e) if e.is_already_processing() => {}
            Err(e) => warn!(video_id = %video_id, "Failed to start processing: {}", e),
        }

        Ok(video)
    }

    /// Fetch a video the requester may see.
    pub async fn get(&self, requester: &Requester, video_id: &VideoId) -> ApiResult<Video> {
        let video = self.load(video_id).await?;
        authorize_read(requester, &video)?;
        Ok(video)
    }

    /// The requester's own videos, newest first.
    pub async fn list(
        &self,
        requester: &Requester,
        status: Option<LifecycleState>,
    ) -> ApiResult<Vec<Video>> {
        let videos = self
            .repository
            .list_by_owner(&requester.user_id, status)
            .await?;
        Ok(self.without_tombstoned(videos))
    }

    /// Every video, newest first. Admin only.
    pub async fn admin_list(
        &self,
        requester: &Requester,
        status: Option<LifecycleState>,
    ) -> ApiResult<Vec<Video>> {
        if !requester.is_admin() {
            return Err(ApiError::forbidden("Admin access required"));
        }
        let videos = self.repository.list_all(status).await?;
        Ok(self.without_tombstoned(videos))
    }

    /// Edit display name and/or original filename. The storage key never changes.
    pub async fn rename(
        &self,
        requester: &Requester,
        video_id: &VideoId,
        request: RenameRequest,
    ) -> ApiResult<Video> {
        let video = self.load(video_id).await?;
        authorize_write(requester, &video)?;

        if request.display_name.is_none() && request.original_filename.is_none() {
            return Err(ApiError::validation("Nothing to update"));
        }
        let display_name = request
            .display_name
            .as_deref()
            .map(validate_display_name)
            .transpose()
            .map_err(ApiError::Validation)?;
        let original_filename = match request.original_filename.as_deref().map(sanitize_filename) {
            Some(name) if name.is_empty() => {
                return Err(ApiError::validation("Filename cannot be empty"))
            }
            other => other,
        };

        let updated = self
            .repository
            .apply_update(
                video_id,
                None,
                VideoUpdate::Rename {
                    display_name,
                    original_filename,
                },
            )
            .await?;
        info!(video_id = %video_id, "Video renamed");
        Ok(updated)
    }

    /// Two-phase delete: bytes first, then the record.
    ///
    /// A failed byte delete leaves both in place. A failed record delete
    /// tombstones the id; it is hidden from reads and the sweeper retries.
    pub async fn delete(&self, requester: &Requester, video_id: &VideoId) -> ApiResult<DeleteOutcome> {
        let video = self.load(video_id).await?;
        authorize_write(requester, &video)?;

        self.store.delete(&video.storage_key).await?;

        match self.repository.delete(video_id).await {
            Ok(_) => {
                info!(video_id = %video_id, "Video deleted");
                metrics::record_video_deleted("complete");
                Ok(DeleteOutcome::Complete)
            }
            Err(e) => {
                warn!(
                    video_id = %video_id,
                    "Bytes deleted but record delete failed, tombstoning: {}", e
                );
                self.tombstones.add(video_id.clone());
                metrics::record_video_deleted("tombstoned");
                Ok(DeleteOutcome::Tombstoned)
            }
        }
    }

    /// Explicit processing trigger. Duplicates are reported, not failed.
    pub async fn start_processing(
        &self,
        requester: &Requester,
        video_id: &VideoId,
    ) -> ApiResult<ProcessingTrigger> {
        let video = self.load(video_id).await?;
        authorize_write(requester, &video)?;

        match self.orchestrator.start_processing(video_id).await {
            Ok(ticket) => Ok(ProcessingTrigger {
                video_id: ticket.video_id.clone(),
                run_seq: ticket.run_seq,
                already_processing: false,
            }),
            Err(OrchestratorError::AlreadyProcessing { run_seq, .. }) => Ok(ProcessingTrigger {
                video_id: video_id.clone(),
                run_seq,
                already_processing: true,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Start a new run. Admins may re-queue any video that is not pending;
    /// owners only one whose analysis failed.
    pub async fn requeue(&self, requester: &Requester, video_id: &VideoId) -> ApiResult<ProcessingTrigger> {
        let video = self.load(video_id).await?;
        authorize_read(requester, &video)?;
        if !requester.is_admin() && video.lifecycle_state != LifecycleState::Failed {
            return Err(ApiError::forbidden(
                "Only failed videos can be re-queued by their owner",
            ));
        }

        // Owners re-queue the failed run they saw, not whatever is current
        let expected_run = (!requester.is_admin()).then_some(video.run_seq);
        let ticket = self.orchestrator.requeue(video_id, expected_run).await?;
        info!(
            video_id = %video_id,
            run_seq = ticket.run_seq,
            requested_by = %requester.user_id,
            "Re-queue scheduled"
        );
        Ok(ProcessingTrigger {
            video_id: ticket.video_id.clone(),
            run_seq: ticket.run_seq,
            already_processing: !ticket.owns_run(),
        })
    }

    async fn load(&self, video_id: &VideoId) -> ApiResult<Video> {
        if self.tombstones.contains(video_id) {
            return Err(ApiError::not_found(format!("Video {}", video_id)));
        }
        self.repository
            .get(video_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Video {}", video_id)))
    }

    fn without_tombstoned(&self, videos: Vec<Video>) -> Vec<Video> {
        if self.tombstones.is_empty() {
            return videos;
        }
        videos
            .into_iter()
            .filter(|v| !self.tombstones.contains(&v.id))
            .collect()
    }
}

fn authorize_read(requester: &Requester, video: &Video) -> ApiResult<()> {
    if requester.can_access(&video.owner_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not allowed to access this video"))
    }
}

fn authorize_write(requester: &Requester, video: &Video) -> ApiResult<()> {
    authorize_read(requester, video)?;
    if requester.is_admin() || requester.role.can_upload() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Modifying videos requires the editor role"))
    }
}
