//! Video lifecycle state machine.
//!
//! A video moves `Pending -> Processing -> {Ready, Blocked, Failed}`. The
//! only way out of a terminal state is an administrative re-queue, which
//! starts a new run with a higher run sequence number.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::Assessment;

/// Synthetic progress checkpoints emitted during one processing run.
pub const PROGRESS_CHECKPOINTS: [u8; 5] = [0, 25, 50, 75, 100];

/// Lifecycle state of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Uploaded, waiting for a processing run to claim it
    #[default]
    Pending,
    /// A processing run owns the video
    Processing,
    /// Classified safe, may be streamed
    Ready,
    /// Classified as matching the block-set
    Blocked,
    /// Classification failed, verdict undetermined
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Processing => "processing",
            LifecycleState::Ready => "ready",
            LifecycleState::Blocked => "blocked",
            LifecycleState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions without a re-queue).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Ready | LifecycleState::Blocked | LifecycleState::Failed
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(LifecycleState::Pending),
            "processing" => Ok(LifecycleState::Processing),
            "ready" => Ok(LifecycleState::Ready),
            "blocked" => Ok(LifecycleState::Blocked),
            "failed" => Ok(LifecycleState::Failed),
            other => Err(format!("unknown lifecycle state '{}'", other)),
        }
    }
}

/// Outcome of content classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Undetermined,
    Safe,
    Flagged,
}

impl SafetyVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyVerdict::Undetermined => "undetermined",
            SafetyVerdict::Safe => "safe",
            SafetyVerdict::Flagged => "flagged",
        }
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single atomic mutation of a video record.
///
/// Repositories apply these under their per-record lock via
/// [`Video::apply`](crate::Video::apply), so every update is checked
/// against the transition table before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoUpdate {
    /// `Pending -> Processing`, progress reset to 0
    Claim,
    /// Progress tick within `Processing`
    Progress { percent: u8 },
    /// Classifier returned labels; the assessment decides the terminal state
    Classified { assessment: Assessment },
    /// Classifier errored or timed out
    ClassificationFailed { reason: String },
    /// Administrative re-queue: starts a new run
    Requeue,
    /// Edit mutable text fields; never touches the storage key
    Rename {
        display_name: Option<String>,
        original_filename: Option<String>,
    },
}

impl VideoUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            VideoUpdate::Claim => "claim",
            VideoUpdate::Progress { .. } => "progress",
            VideoUpdate::Classified { .. } => "classified",
            VideoUpdate::ClassificationFailed { .. } => "classification_failed",
            VideoUpdate::Requeue => "requeue",
            VideoUpdate::Rename { .. } => "rename",
        }
    }
}

/// Rejected lifecycle updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Cannot apply '{update}' to a video in state '{from}'")]
    InvalidTransition {
        from: LifecycleState,
        update: &'static str,
    },

    #[error("Run {expected} was superseded by run {current}")]
    StaleRun { expected: u64, current: u64 },

    #[error("Progress may not decrease within a run ({current} -> {requested})")]
    ProgressRegression { current: u8, requested: u8 },

    #[error("Progress tick out of range: {0}")]
    InvalidProgress(u8),
}

impl LifecycleError {
    pub fn invalid_transition(from: LifecycleState, update: &VideoUpdate) -> Self {
        Self::InvalidTransition {
            from,
            update: update.name(),
        }
    }

    /// True when the update came from a run that a re-queue has replaced.
    pub fn is_stale(&self) -> bool {
        matches!(self, LifecycleError::StaleRun { .. })
    }
}
