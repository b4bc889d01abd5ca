//! Shared data models for the VGuard backend.
//!
//! This crate provides Serde-serializable types for:
//! - The video entity and its identifiers
//! - The lifecycle state machine (states, verdicts, updates)
//! - Block-set / caution-set label policy
//! - Progress event and WebSocket message schemas
//! - Requester roles

pub mod event;
pub mod lifecycle;
pub mod policy;
pub mod role;
pub mod video;
pub mod ws;

// Re-export common types
pub use event::{EventKind, ProgressEvent};
pub use lifecycle::{LifecycleError, LifecycleState, SafetyVerdict, VideoUpdate, PROGRESS_CHECKPOINTS};
pub use policy::{Assessment, LabelPolicy};
pub use role::{Requester, Role};
pub use video::{content_type_for, VerdictRecord, Video, VideoId};
pub use ws::{ClientMessage, ServerMessage};
