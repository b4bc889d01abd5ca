//! The `VideoRepository` abstraction.

use std::collections::HashSet;

use async_trait::async_trait;
use vguard_models::{LifecycleState, Video, VideoId, VideoUpdate};

use crate::error::{RepositoryError, RepositoryResult};

/// Durable store for video records.
///
/// Every mutation goes through [`apply_update`](VideoRepository::apply_update),
/// which implementations must execute atomically per record: read, validate
/// against the lifecycle transition table, and write, with no other writer
/// interleaving for the same id.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a new record. Fails if the id is taken.
    async fn create(&self, video: Video) -> RepositoryResult<()>;

    async fn get(&self, id: &VideoId) -> RepositoryResult<Option<Video>>;

    /// Videos uploaded by `owner_id`, newest first.
    async fn list_by_owner(
        &self,
        owner_id: &str,
        status: Option<LifecycleState>,
    ) -> RepositoryResult<Vec<Video>>;

    /// All videos, newest first.
    async fn list_all(&self, status: Option<LifecycleState>) -> RepositoryResult<Vec<Video>>;

    /// Atomically apply one update and return the committed record.
    ///
    /// With `expected_run` set, the update is rejected as stale unless the
    /// record's run sequence number still matches.
    async fn apply_update(
        &self,
        id: &VideoId,
        expected_run: Option<u64>,
        update: VideoUpdate,
    ) -> RepositoryResult<Video>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: &VideoId) -> RepositoryResult<bool>;

    /// Every storage key referenced by a record.
    async fn storage_keys(&self) -> RepositoryResult<HashSet<String>>;

    async fn check_connectivity(&self) -> RepositoryResult<()>;

    /// Like `get`, but a missing record is an error.
    async fn require(&self, id: &VideoId) -> RepositoryResult<Video> {
        self.get(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(id.as_str()))
    }
}
