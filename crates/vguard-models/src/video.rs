//! Video entity models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::lifecycle::{LifecycleError, LifecycleState, SafetyVerdict, VideoUpdate};

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Verdict committed by one processing run. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerdictRecord {
    pub run_seq: u64,
    pub verdict: SafetyVerdict,
    /// Restricted labels that drove the verdict
    #[serde(default)]
    pub matched_labels: Vec<String>,
    /// Caution-set match on an otherwise safe video
    #[serde(default)]
    pub advisory: bool,
    pub decided_at: DateTime<Utc>,
}

/// Video record stored in the metadata repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,

    /// Uploading user; drives all access filtering
    pub owner_id: String,

    /// Key into the video store, fixed at upload
    pub storage_key: String,

    pub display_name: String,

    pub original_filename: String,

    pub size_bytes: u64,

    pub uploaded_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub lifecycle_state: LifecycleState,

    /// Only meaningful while processing
    #[serde(default)]
    pub progress_percent: u8,

    /// Incremented by every re-queue
    #[serde(default = "first_run")]
    pub run_seq: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Append-only, one record per finished run
    #[serde(default)]
    pub verdicts: Vec<VerdictRecord>,
}

fn first_run() -> u64 {
    1
}

impl Video {
    /// Create a new pending video record.
    pub fn new(
        id: VideoId,
        owner_id: impl Into<String>,
        storage_key: impl Into<String>,
        display_name: impl Into<String>,
        original_filename: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id: owner_id.into(),
            storage_key: storage_key.into(),
            display_name: display_name.into(),
            original_filename: original_filename.into(),
            size_bytes,
            uploaded_at: now,
            updated_at: now,
            lifecycle_state: LifecycleState::Pending,
            progress_percent: 0,
            run_seq: first_run(),
            failure_reason: None,
            verdicts: Vec::new(),
        }
    }

    /// Verdict record of the current run, if it has finished.
    pub fn current_verdict(&self) -> Option<&VerdictRecord> {
        self.verdicts.iter().rev().find(|v| v.run_seq == self.run_seq)
    }

    /// Safety verdict of the current run (`None` until classification ends).
    pub fn safety_verdict(&self) -> Option<SafetyVerdict> {
        self.current_verdict().map(|v| v.verdict)
    }

    /// Streaming is allowed iff the video is READY with a SAFE verdict.
    pub fn is_streamable(&self) -> bool {
        self.lifecycle_state == LifecycleState::Ready
            && self.safety_verdict() == Some(SafetyVerdict::Safe)
    }

    /// Caution-set labels matched on a streamable video.
    pub fn has_advisory(&self) -> bool {
        self.current_verdict().map(|v| v.advisory).unwrap_or(false)
    }

    /// Progress as consumers should see it: hidden outside `Processing`.
    pub fn visible_progress(&self) -> Option<u8> {
        (self.lifecycle_state == LifecycleState::Processing).then_some(self.progress_percent)
    }

    /// Content type inferred from the stored file's extension.
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.storage_key)
    }

    /// Apply one update, enforcing the transition table.
    ///
    /// `expected_run` guards updates issued by a processing run: if a
    /// re-queue bumped `run_seq` since the run started, the update is
    /// rejected as stale and the record is left untouched.
    pub fn apply(
        &mut self,
        expected_run: Option<u64>,
        update: VideoUpdate,
    ) -> Result<(), LifecycleError> {
        if let Some(expected) = expected_run {
            if expected != self.run_seq {
                return Err(LifecycleError::StaleRun {
                    expected,
                    current: self.run_seq,
                });
            }
        }

        let from = self.lifecycle_state;
        match update {
            VideoUpdate::Claim => {
                if from != LifecycleState::Pending {
                    return Err(LifecycleError::invalid_transition(from, &VideoUpdate::Claim));
                }
                self.lifecycle_state = LifecycleState::Processing;
                self.progress_percent = 0;
                self.failure_reason = None;
            }
            VideoUpdate::Progress { percent } => {
                if from != LifecycleState::Processing {
                    return Err(LifecycleError::invalid_transition(
                        from,
                        &VideoUpdate::Progress { percent },
                    ));
                }
                // 100 is reserved for the terminal classification commit
                if percent >= 100 {
                    return Err(LifecycleError::InvalidProgress(percent));
                }
                if percent < self.progress_percent {
                    return Err(LifecycleError::ProgressRegression {
                        current: self.progress_percent,
                        requested: percent,
                    });
                }
                self.progress_percent = percent;
            }
            VideoUpdate::Classified { assessment } => {
                if from != LifecycleState::Processing {
                    return Err(LifecycleError::invalid_transition(
                        from,
                        &VideoUpdate::Classified { assessment },
                    ));
                }
                self.lifecycle_state = assessment.target_state();
                self.progress_percent = 100;
                self.verdicts.push(VerdictRecord {
                    run_seq: self.run_seq,
                    verdict: assessment.verdict(),
                    matched_labels: assessment.matched_labels().to_vec(),
                    advisory: assessment.is_advisory(),
                    decided_at: Utc::now(),
                });
            }
            VideoUpdate::ClassificationFailed { reason } => {
                if from != LifecycleState::Processing {
                    return Err(LifecycleError::invalid_transition(
                        from,
                        &VideoUpdate::ClassificationFailed { reason },
                    ));
                }
                self.lifecycle_state = LifecycleState::Failed;
                self.failure_reason = Some(reason);
                self.verdicts.push(VerdictRecord {
                    run_seq: self.run_seq,
                    verdict: SafetyVerdict::Undetermined,
                    matched_labels: Vec::new(),
                    advisory: false,
                    decided_at: Utc::now(),
                });
            }
            VideoUpdate::Requeue => {
                if from == LifecycleState::Pending {
                    return Err(LifecycleError::invalid_transition(from, &VideoUpdate::Requeue));
                }
                self.run_seq += 1;
                self.lifecycle_state = LifecycleState::Pending;
                self.progress_percent = 0;
                self.failure_reason = None;
            }
            VideoUpdate::Rename {
                display_name,
                original_filename,
            } => {
                if let Some(name) = display_name {
                    self.display_name = name;
                }
                if let Some(filename) = original_filename {
                    self.original_filename = filename;
                }
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Content type for a stored filename, by extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}
