//! Range streaming.
//!
//! Authorization and playability are decided from one repository snapshot
//! before the store is touched. Bytes are then streamed in bounded chunks;
//! the store handle lives only as long as the returned stream.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use vguard_metadata::{RepositoryError, VideoRepository};
use vguard_models::{LifecycleState, Requester, SafetyVerdict, VideoId};
use vguard_storage::{parse_range, ByteRange, ChunkStream, StorageError, VideoStore};

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Not allowed to stream this video")]
    Forbidden,

    #[error("Video is not playable ({state})")]
    NotPlayable {
        state: LifecycleState,
        verdict: Option<SafetyVerdict>,
    },

    #[error("Range not satisfiable (total size {total})")]
    RangeNotSatisfiable { total: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<StreamError> for ApiError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::NotFound(id) => ApiError::not_found(format!("Video {}", id)),
            StreamError::Forbidden => ApiError::forbidden("Not allowed to stream this video"),
            StreamError::NotPlayable { state, verdict } => ApiError::NotPlayable { state, verdict },
            StreamError::RangeNotSatisfiable { total } => ApiError::RangeNotSatisfiable { total },
            StreamError::Storage(e) => ApiError::Storage(e),
            StreamError::Repository(e) => ApiError::Repository(e),
        }
    }
}

/// A stream ready to be sent.
pub struct VideoStream {
    pub content_type: &'static str,
    pub total: u64,
    /// Served span; `None` means the whole object
    pub range: Option<ByteRange>,
    pub body: ChunkStream,
}

impl VideoStream {
    pub fn is_partial(&self) -> bool {
        self.range.is_some()
    }

    /// Number of bytes in the body.
    pub fn content_length(&self) -> u64 {
        self.range.map(|r| r.len()).unwrap_or(self.total)
    }

    /// `Content-Range` value for partial responses.
    pub fn content_range(&self) -> Option<String> {
        self.range.map(|r| r.content_range(self.total))
    }
}

#[derive(Clone)]
pub struct StreamingService {
    repository: Arc<dyn VideoRepository>,
    store: Arc<dyn VideoStore>,
    chunk_size: usize,
}

impl StreamingService {
    pub fn new(
        repository: Arc<dyn VideoRepository>,
        store: Arc<dyn VideoStore>,
        chunk_size: usize,
    ) -> Self {
        Self {
            repository,
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Open a video for streaming, honoring an optional `Range` header value.
    pub async fn open(
        &self,
        requester: &Requester,
        video_id: &VideoId,
        range_header: Option<&str>,
    ) -> Result<VideoStream, StreamError> {
        let video = self
            .repository
            .get(video_id)
            .await?
            .ok_or_else(|| StreamError::NotFound(video_id.to_string()))?;

        if !requester.can_access(&video.owner_id) {
            return Err(StreamError::Forbidden);
        }
        if !video.is_streamable() {
            return Err(StreamError::NotPlayable {
                state: video.lifecycle_state,
                verdict: video.safety_verdict(),
            });
        }

        let total = self.store.head(&video.storage_key).await?.size;
        let range = match range_header {
            Some(header) => Some(
                parse_range(header, total)
                    .map_err(|e| StreamError::RangeNotSatisfiable { total: e.total })?,
            ),
            None => None,
        };

        debug!(
            video_id = %video_id,
            total,
            range = ?range,
            "Opening video stream"
        );

        let body = self
            .store
            .read_range(&video.storage_key, range, self.chunk_size)
            .await?;

        Ok(VideoStream {
            content_type: video.content_type(),
            total,
            range,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use vguard_metadata::MemoryVideoRepository;
    use vguard_models::{Assessment, Role, Video, VideoUpdate};
    use vguard_storage::LocalVideoStore;

    const DATA: &[u8] = b"0123456789abcdefghij";

    async fn setup() -> (tempfile::TempDir, Arc<MemoryVideoRepository>, StreamingService, VideoId) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryVideoRepository::new());
        let store = Arc::new(LocalVideoStore::new(dir.path()).await.unwrap());
        store
            .put(
                "alice/v1.mp4",
                stream::iter(vec![Ok(Bytes::from_static(DATA))]).boxed(),
                1024,
            )
            .await
            .unwrap();
        let id = VideoId::from("v1");
        repo.create(Video::new(id.clone(), "alice", "alice/v1.mp4", "V1", "v1.mp4", DATA.len() as u64))
            .await
            .unwrap();
        let service = StreamingService::new(repo.clone(), store, 4);
        (dir, repo, service, id)
    }

    async fn make_ready(repo: &MemoryVideoRepository, id: &VideoId, assessment: Assessment) {
        repo.apply_update(id, Some(1), VideoUpdate::Claim).await.unwrap();
        repo.apply_update(id, Some(1), VideoUpdate::Classified { assessment })
            .await
            .unwrap();
    }

    async fn collect(stream: VideoStream) -> Vec<u8> {
        let mut body = stream.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 4);
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_pending_video_is_not_playable() {
        let (_dir, _repo, service, id) = setup().await;
        let alice = Requester::new("alice", Role::Viewer);
        let err = service.open(&alice, &id, None).await.err().unwrap();
        assert!(matches!(
            err,
            StreamError::NotPlayable {
                state: LifecycleState::Pending,
                verdict: None
            }
        ));
    }

    #[tokio::test]
    async fn test_access_is_checked_before_playability() {
        let (_dir, _repo, service, id) = setup().await;
        let bob = Requester::new("bob", Role::Editor);
        let err = service.open(&bob, &id, None).await.err().unwrap();
        assert!(matches!(err, StreamError::Forbidden));
    }

    #[tokio::test]
    async fn test_blocked_video_is_not_playable() {
        let (_dir, repo, service, id) = setup().await;
        make_ready(
            &repo,
            &id,
            Assessment::Flagged {
                labels: vec!["Weapons".to_string()],
            },
        )
        .await;
        let alice = Requester::new("alice", Role::Viewer);
        let err = service.open(&alice, &id, None).await.err().unwrap();
        assert!(matches!(
            err,
            StreamError::NotPlayable {
                state: LifecycleState::Blocked,
                verdict: Some(SafetyVerdict::Flagged)
            }
        ));
    }

    #[tokio::test]
    async fn test_full_and_partial_reads() {
        let (_dir, repo, service, id) = setup().await;
        make_ready(&repo, &id, Assessment::Safe).await;
        let admin = Requester::new("root", Role::Admin);

        let full = service.open(&admin, &id, None).await.unwrap();
        assert!(!full.is_partial());
        assert_eq!(full.content_type, "video/mp4");
        assert_eq!(full.content_length(), 20);
        assert_eq!(collect(full).await, DATA);

        let partial = service.open(&admin, &id, Some("bytes=5-14")).await.unwrap();
        assert_eq!(partial.content_range().unwrap(), "bytes 5-14/20");
        assert_eq!(partial.content_length(), 10);
        assert_eq!(collect(partial).await, &DATA[5..15]);

        let suffix = service.open(&admin, &id, Some("bytes=-3")).await.unwrap();
        assert_eq!(collect(suffix).await, b"hij");
    }

    #[tokio::test]
    async fn test_unsatisfiable_ranges_report_total() {
        let (_dir, repo, service, id) = setup().await;
        make_ready(&repo, &id, Assessment::Safe).await;
        let alice = Requester::new("alice", Role::Viewer);

        for header in ["bytes=20-", "bytes=0-1,4-5", "items=0-1"] {
            let err = service.open(&alice, &id, Some(header)).await.err().unwrap();
            assert!(
                matches!(err, StreamError::RangeNotSatisfiable { total: 20 }),
                "{header}"
            );
        }
    }
}
