//! Local filesystem video store.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::range::ByteRange;
use crate::store::{ChunkStream, ObjectInfo, UploadStream, VideoStore};

const PART_SUFFIX: &str = ".part";

/// Stores each object as a file under a root directory.
#[derive(Debug, Clone)]
pub struct LocalVideoStore {
    root: PathBuf,
}

impl LocalVideoStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("Local video store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting anything that escapes the root.
    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.ends_with(PART_SUFFIX)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::invalid_key(key));
        }
        Ok(self.root.join(relative))
    }

    async fn object_info(&self, key: &str, path: &Path) -> StorageResult<ObjectInfo> {
        let meta = match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::not_found(key)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(key))
            }
            Err(e) => return Err(e.into()),
        };

        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);

        Ok(ObjectInfo {
            key: key.to_string(),
            size: meta.len(),
            last_modified,
        })
    }

    async fn write_part(
        part: &Path,
        mut body: UploadStream<'_>,
        max_bytes: u64,
    ) -> StorageResult<u64> {
        let mut file = fs::File::create(part).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::upload_failed(e.to_string()))?;
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(StorageError::TooLarge { limit: max_bytes });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl VideoStore for LocalVideoStore {
    async fn put(&self, key: &str, body: UploadStream<'_>, max_bytes: u64) -> StorageResult<u64> {
        let path = self.path_for(key)?;
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut part = path.clone().into_os_string();
        part.push(PART_SUFFIX);
        let part = PathBuf::from(part);

        match Self::write_part(&part, body, max_bytes).await {
            Ok(size) => {
                fs::rename(&part, &path).await?;
                debug!(key = %key, size, "Stored object");
                Ok(size)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&part).await {
                    warn!(key = %key, "Failed to remove partial upload: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let path = self.path_for(key)?;
        self.object_info(key, &path).await
    }

    async fn read_range(
        &self,
        key: &str,
        range: Option<ByteRange>,
        chunk_size: usize,
    ) -> StorageResult<ChunkStream> {
        let path = self.path_for(key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(key))
            }
            Err(e) => return Err(e.into()),
        };

        let stream = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                ReaderStream::with_capacity(file.take(range.len()), chunk_size).boxed()
            }
            None => ReaderStream::with_capacity(file, chunk_size).boxed(),
        };

        Ok(stream)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        debug!("Deleting {}", key);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // Removed since its parent was read
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::ListFailed(e.to_string())),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?
            {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.ends_with(PART_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }
                match self.object_info(&key, &path).await {
                    Ok(info) => objects.push(info),
                    // Deleted between the directory read and the stat
                    Err(e) if e.is_not_found() => {
                        debug!("Skipping vanished object while listing: {}", key)
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        fs::metadata(&self.root)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::config_error(format!("Upload dir unavailable: {}", e)))
    }
}
