//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vguard_metadata::RepositoryError;
use vguard_models::{LifecycleError, LifecycleState, SafetyVerdict};
use vguard_storage::StorageError;
use vguard_worker::OrchestratorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Video exists and the caller may see it, but it is not streamable
    #[error("Video is not playable (state: {state}, verdict: {})", verdict.map(|v| v.as_str()).unwrap_or("none"))]
    NotPlayable {
        state: LifecycleState,
        verdict: Option<SafetyVerdict>,
    },

    #[error("Range not satisfiable (total size {total})")]
    RangeNotSatisfiable { total: u64 },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) | ApiError::NotPlayable { .. } => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Repository(e) => match e {
                RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::AlreadyExists(_) | RepositoryError::Lifecycle(_) => {
                    StatusCode::CONFLICT
                }
                RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::NotPlayable { .. } => Some("not_playable"),
            ApiError::RangeNotSatisfiable { .. } => Some("range_not_satisfiable"),
            ApiError::PayloadTooLarge(_) | ApiError::Storage(StorageError::TooLarge { .. }) => {
                Some("payload_too_large")
            }
            ApiError::RateLimited => Some("rate_limited"),
            ApiError::Repository(RepositoryError::Lifecycle(_)) => Some("invalid_transition"),
            _ => None,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::NotFound(id) => Self::NotFound(format!("Video {}", id)),
            e @ OrchestratorError::AlreadyProcessing { .. } => Self::Conflict(e.to_string()),
            e @ OrchestratorError::InvalidState { .. } => Self::Conflict(e.to_string()),
            OrchestratorError::ConfigError(msg) => Self::Internal(msg),
            OrchestratorError::Repository(e) => Self::Repository(e),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        Self::Repository(RepositoryError::Lifecycle(e))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<LifecycleState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<SafetyVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut body = ErrorResponse {
            detail,
            code: self.code().map(str::to_string),
            state: None,
            verdict: None,
            total: None,
        };

        match self {
            ApiError::NotPlayable { state, verdict } => {
                body.state = Some(state);
                body.verdict = Some(verdict.unwrap_or(SafetyVerdict::Undetermined));
                (status, Json(body)).into_response()
            }
            ApiError::RangeNotSatisfiable { total } => {
                body.total = Some(total);
                (
                    status,
                    [
                        (header::CONTENT_RANGE, format!("bytes */{}", total)),
                        (header::ACCEPT_RANGES, "bytes".to_string()),
                    ],
                    Json(body),
                )
                    .into_response()
            }
            ApiError::RateLimited => {
                (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response()
            }
            _ => (status, Json(body)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::NotPlayable {
                state: LifecycleState::Processing,
                verdict: None
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RangeNotSatisfiable { total: 10 }.status_code(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            ApiError::from(StorageError::TooLarge { limit: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(RepositoryError::not_found("v1")).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_range_not_satisfiable_reports_total() {
        let response = ApiError::RangeNotSatisfiable { total: 4096 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */4096"
        );
    }

    #[test]
    fn test_orchestrator_errors_map_to_conflict() {
        let err = ApiError::from(OrchestratorError::InvalidState {
            state: LifecycleState::Ready,
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
