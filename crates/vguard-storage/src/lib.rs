//! Video byte storage.
//!
//! This crate provides:
//! - The `VideoStore` abstraction (write-once put, range read, delete, list)
//! - A local filesystem backend
//! - A Cloudflare R2 (S3 API) backend
//! - HTTP byte-range parsing

pub mod config;
pub mod error;
pub mod local;
pub mod r2;
pub mod range;
pub mod store;

pub use config::{build_store, StoreConfig};
pub use error::{StorageError, StorageResult};
pub use local::LocalVideoStore;
pub use r2::{R2Config, R2VideoStore};
pub use range::{parse_range, ByteRange, RangeNotSatisfiable};
pub use store::{ChunkStream, ObjectInfo, UploadStream, VideoStore, DEFAULT_CHUNK_SIZE};
