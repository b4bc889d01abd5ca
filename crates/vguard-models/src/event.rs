//! Progress events published while a video is processed.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lifecycle::{LifecycleState, SafetyVerdict};
use crate::video::VideoId;

/// Event payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A run claimed the video
    Started,
    /// Progress checkpoint (0-100)
    Progress { percent: u8 },
    /// Classification finished
    Completed {
        verdict: SafetyVerdict,
        state: LifecycleState,
        #[serde(default)]
        advisory: bool,
    },
    /// Classification failed
    Failed { reason: String },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Progress { .. } => "progress",
            EventKind::Completed { .. } => "completed",
            EventKind::Failed { .. } => "failed",
        }
    }
}

/// One event about one processing run of one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub video_id: VideoId,
    pub owner_id: String,
    pub run_seq: u64,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    fn new(video_id: &VideoId, owner_id: &str, run_seq: u64, kind: EventKind) -> Self {
        Self {
            video_id: video_id.clone(),
            owner_id: owner_id.to_string(),
            run_seq,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn started(video_id: &VideoId, owner_id: &str, run_seq: u64) -> Self {
        Self::new(video_id, owner_id, run_seq, EventKind::Started)
    }

    pub fn progress(video_id: &VideoId, owner_id: &str, run_seq: u64, percent: u8) -> Self {
        Self::new(
            video_id,
            owner_id,
            run_seq,
            EventKind::Progress {
                percent: percent.min(100),
            },
        )
    }

    pub fn completed(
        video_id: &VideoId,
        owner_id: &str,
        run_seq: u64,
        verdict: SafetyVerdict,
        state: LifecycleState,
        advisory: bool,
    ) -> Self {
        Self::new(
            video_id,
            owner_id,
            run_seq,
            EventKind::Completed {
                verdict,
                state,
                advisory,
            },
        )
    }

    pub fn failed(video_id: &VideoId, owner_id: &str, run_seq: u64, reason: impl Into<String>) -> Self {
        Self::new(
            video_id,
            owner_id,
            run_seq,
            EventKind::Failed {
                reason: reason.into(),
            },
        )
    }

    /// Progress percentage carried by this event, if any.
    pub fn percent(&self) -> Option<u8> {
        match self.kind {
            EventKind::Progress { percent } => Some(percent),
            _ => None,
        }
    }
}
