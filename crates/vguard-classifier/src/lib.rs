//! Content classification.
//!
//! The classifier is an external capability: given a stored video, return
//! the set of content labels detected in it. This crate defines that seam
//! and an HTTP client for a moderation service that implements it.

pub mod client;
pub mod error;

use std::collections::BTreeSet;

use async_trait::async_trait;

pub use client::{ClassifierConfig, HttpClassifier};
pub use error::{ClassifierError, ClassifierResult};

/// Labels detected in one video.
pub type LabelSet = BTreeSet<String>;

#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Classify the video stored under `storage_key`.
    async fn classify(&self, storage_key: &str) -> ClassifierResult<LabelSet>;
}
