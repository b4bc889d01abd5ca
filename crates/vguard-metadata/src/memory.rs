//! In-process repository backed by a [`DashMap`].
//!
//! Each update runs while holding the map's shard lock for that id, which
//! makes claim-for-processing a compare-and-set against the current state
//! and run sequence number.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use vguard_models::{LifecycleState, Video, VideoId, VideoUpdate};

use crate::error::{RepositoryError, RepositoryResult};
use crate::metrics::{record_operation, record_rejected_update};
use crate::repository::VideoRepository;

#[derive(Debug, Default)]
pub struct MemoryVideoRepository {
    videos: DashMap<VideoId, Video>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    fn collect<F>(&self, filter: F) -> Vec<Video>
    where
        F: Fn(&Video) -> bool,
    {
        let mut videos: Vec<Video> = self
            .videos
            .iter()
            .filter(|v| filter(v.value()))
            .map(|v| v.value().clone())
            .collect();
        videos.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        videos
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn create(&self, video: Video) -> RepositoryResult<()> {
        let result = match self.videos.entry(video.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(video.id.to_string())),
            Entry::Vacant(vacant) => {
                debug!(video_id = %video.id, owner_id = %video.owner_id, "Created video record");
                vacant.insert(video);
                Ok(())
            }
        };
        record_operation("create", result.is_ok());
        result
    }

    async fn get(&self, id: &VideoId) -> RepositoryResult<Option<Video>> {
        Ok(self.videos.get(id).map(|v| v.value().clone()))
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        status: Option<LifecycleState>,
    ) -> RepositoryResult<Vec<Video>> {
        Ok(self.collect(|v| {
            v.owner_id == owner_id && status.map_or(true, |s| v.lifecycle_state == s)
        }))
    }

    async fn list_all(&self, status: Option<LifecycleState>) -> RepositoryResult<Vec<Video>> {
        Ok(self.collect(|v| status.map_or(true, |s| v.lifecycle_state == s)))
    }

    async fn apply_update(
        &self,
        id: &VideoId,
        expected_run: Option<u64>,
        update: VideoUpdate,
    ) -> RepositoryResult<Video> {
        let name = update.name();
        let mut video = self
            .videos
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found(id.as_str()))?;

        match video.apply(expected_run, update) {
            Ok(()) => {
                record_operation(name, true);
                Ok(video.value().clone())
            }
            Err(e) => {
                record_rejected_update(name, e.is_stale());
                Err(e.into())
            }
        }
    }

    async fn delete(&self, id: &VideoId) -> RepositoryResult<bool> {
        let removed = self.videos.remove(id).is_some();
        record_operation("delete", true);
        Ok(removed)
    }

    async fn storage_keys(&self) -> RepositoryResult<HashSet<String>> {
        Ok(self
            .videos
            .iter()
            .map(|v| v.value().storage_key.clone())
            .collect())
    }

    async fn check_connectivity(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
