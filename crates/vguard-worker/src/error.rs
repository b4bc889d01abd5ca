//! Orchestrator error types.

use thiserror::Error;
use vguard_metadata::RepositoryError;
use vguard_models::{LifecycleError, LifecycleState};

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Video not found: {0}")]
    NotFound(String),

    /// A run for this video is already in flight. Callers treat this as a no-op.
    #[error("Video {video_id} is already being processed (run {run_seq})")]
    AlreadyProcessing { video_id: String, run_seq: u64 },

    #[error("Video is {state} and cannot be processed without a re-queue")]
    InvalidState { state: LifecycleState },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl OrchestratorError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_already_processing(&self) -> bool {
        matches!(self, OrchestratorError::AlreadyProcessing { .. })
    }
}

impl From<RepositoryError> for OrchestratorError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::Lifecycle(LifecycleError::InvalidTransition { from, .. }) => {
                Self::InvalidState { state: from }
            }
            other => Self::Repository(other),
        }
    }
}
