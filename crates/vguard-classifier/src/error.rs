//! Classifier error types.

use thiserror::Error;

/// Result type for classifier calls.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Errors from the classification service. The message is kept verbatim
/// so it can be stored as the video's failure reason.
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("Classifier configuration error: {0}")]
    ConfigError(String),

    #[error("Classifier temporarily unavailable: {0}")]
    Transient(String),

    #[error("Classifier rejected the request: {0}")]
    Permanent(String),

    #[error("Classifier timed out after {0}s")]
    Timeout(u64),
}

impl ClassifierError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifierError::Transient(_) | ClassifierError::Timeout(_))
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Transient(e.to_string())
        } else {
            Self::Permanent(e.to_string())
        }
    }
}
