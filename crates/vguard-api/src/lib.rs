//! Axum HTTP API server.
//!
//! This crate provides:
//! - Streamed video upload and range-aware playback
//! - Bearer token verification and role checks
//! - Progress events over WebSocket
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
pub mod ws;

pub use auth::{AuthUser, JwtVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{StreamingService, VideoService};
pub use state::{AppState, Collaborators};
