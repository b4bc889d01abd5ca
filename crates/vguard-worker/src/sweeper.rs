//! Background recovery for two-phase deletes.
//!
//! Deleting a video removes its bytes first and its record second. When the
//! second step fails the id is tombstoned here and retried each cycle. The
//! sweeper also deletes stored objects that no record references once they
//! are older than a grace period (bytes from an upload whose record insert
//! failed, or from a crash between the two phases).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::time::interval;
use tracing::{error, info, warn};

use vguard_metadata::VideoRepository;
use vguard_models::VideoId;
use vguard_storage::VideoStore;

use crate::config::SweeperConfig;
use crate::metrics;
use crate::retry::FailureTracker;

/// Ids whose bytes are gone but whose record still needs deleting.
#[derive(Debug, Default)]
pub struct Tombstones {
    pending: DashMap<VideoId, chrono::DateTime<Utc>>,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, video_id: VideoId) {
        self.pending.entry(video_id).or_insert_with(Utc::now);
    }

    pub fn remove(&self, video_id: &VideoId) -> bool {
        self.pending.remove(video_id).is_some()
    }

    pub fn contains(&self, video_id: &VideoId) -> bool {
        self.pending.contains_key(video_id)
    }

    pub fn ids(&self) -> Vec<VideoId> {
        self.pending.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Counts from one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tombstones_cleared: u64,
    pub orphans_deleted: u64,
}

pub struct OrphanSweeper {
    repository: Arc<dyn VideoRepository>,
    store: Arc<dyn VideoStore>,
    tombstones: Arc<Tombstones>,
    config: SweeperConfig,
}

impl OrphanSweeper {
    pub fn new(
        repository: Arc<dyn VideoRepository>,
        store: Arc<dyn VideoStore>,
        tombstones: Arc<Tombstones>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            repository,
            store,
            tombstones,
            config,
        }
    }

    /// Start the background sweep loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Orphan sweeper is disabled");
            return;
        }

        info!(
            "Starting orphan sweeper (interval: {:?}, grace: {:?})",
            self.config.interval, self.config.orphan_grace
        );

        let mut ticker = interval(self.config.interval);
        let mut failures = FailureTracker::new(3);

        loop {
            ticker.tick().await;

            match self.sweep_once().await {
                Ok(report) => {
                    failures.record_success();
                    if report != SweepReport::default() {
                        info!(
                            "Sweep complete: {} tombstones cleared, {} orphans deleted",
                            report.tombstones_cleared, report.orphans_deleted
                        );
                    }
                }
                Err(e) => {
                    if failures.record_failure() {
                        error!("Orphan sweep error: {}", e);
                    }
                }
            }
        }
    }

    /// Run a single sweep cycle.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();

        for video_id in self.tombstones.ids() {
            match self.repository.delete(&video_id).await {
                Ok(_) => {
                    self.tombstones.remove(&video_id);
                    report.tombstones_cleared += 1;
                }
                Err(e) => {
                    warn!(video_id = %video_id, "Tombstoned record still not deletable: {}", e);
                }
            }
        }

        let referenced = self.repository.storage_keys().await?;
        let objects = self.store.list("").await?;
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        let grace_ms = duration_millis(self.config.orphan_grace);

        for object in objects {
            if referenced.contains(&object.key) {
                continue;
            }
            // Without a timestamp the object's age is unknown; leave it
            let Some(modified) = object.last_modified else {
                continue;
            };
            if now_ms.saturating_sub(modified) < grace_ms {
                continue;
            }

            match self.store.delete(&object.key).await {
                Ok(()) => {
                    info!(key = %object.key, size = object.size, "Deleted orphaned object");
                    report.orphans_deleted += 1;
                }
                Err(e) => warn!(key = %object.key, "Failed to delete orphaned object: {}", e),
            }
        }

        metrics::record_sweep_deletion("tombstone", report.tombstones_cleared);
        metrics::record_sweep_deletion("orphan", report.orphans_deleted);
        Ok(report)
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
