//! Video metadata repository.
//!
//! This crate provides:
//! - The `VideoRepository` abstraction (point lookup, owner listing, atomic updates)
//! - An in-process implementation on a concurrent map
//! - Repository operation metrics

pub mod error;
pub mod memory;
pub mod metrics;
pub mod repository;

pub use error::{RepositoryError, RepositoryResult};
pub use memory::MemoryVideoRepository;
pub use repository::VideoRepository;
