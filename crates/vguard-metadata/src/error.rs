//! Repository error types.

use thiserror::Error;
use vguard_models::LifecycleError;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors that can occur during repository operations.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Video already exists: {0}")]
    AlreadyExists(String),

    #[error("Rejected update: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }

    /// True if the update came from a superseded processing run.
    pub fn is_stale(&self) -> bool {
        matches!(self, RepositoryError::Lifecycle(e) if e.is_stale())
    }
}
