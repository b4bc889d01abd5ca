//! The `VideoStore` abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::error::StorageResult;
use crate::range::ByteRange;

/// Default read chunk size for streamed responses.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A stream of byte chunks served from the store.
pub type ChunkStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Upload body. May borrow from the request it is read from.
pub type UploadStream<'a> = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'a>>;

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp (milliseconds since epoch)
    pub last_modified: Option<u64>,
}

/// Durable byte storage for uploaded videos.
///
/// Objects are write-once: `put` on an existing key fails with
/// `AlreadyExists`, so concurrent readers never observe a partial rewrite.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Store `body` under `key`, aborting and removing partial bytes once
    /// more than `max_bytes` have been received. Returns the stored size.
    async fn put(&self, key: &str, body: UploadStream<'_>, max_bytes: u64) -> StorageResult<u64>;

    /// Metadata for one object.
    async fn head(&self, key: &str) -> StorageResult<ObjectInfo>;

    /// Stream `range` of the object (or all of it) in chunks of at most
    /// `chunk_size` bytes. The underlying handle lives only as long as the
    /// returned stream.
    async fn read_range(
        &self,
        key: &str,
        range: Option<ByteRange>,
        chunk_size: usize,
    ) -> StorageResult<ChunkStream>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List objects under a key prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Cheap reachability check used by readiness.
    async fn check_connectivity(&self) -> StorageResult<()>;
}
