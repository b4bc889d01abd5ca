//! Store selection from the environment.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::local::LocalVideoStore;
use crate::r2::{R2Config, R2VideoStore};
use crate::store::VideoStore;

/// Which backend holds uploaded bytes.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Local { upload_dir: PathBuf },
    R2(R2Config),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Local {
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl StoreConfig {
    /// `VIDEO_STORE=local` (default, `UPLOAD_DIR`) or `VIDEO_STORE=r2` (`R2_*`).
    pub fn from_env() -> StorageResult<Self> {
        let backend = std::env::var("VIDEO_STORE").unwrap_or_else(|_| "local".to_string());

        match backend.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local {
                upload_dir: std::env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("uploads")),
            }),
            "r2" => Ok(Self::R2(R2Config::from_env()?)),
            other => Err(StorageError::config_error(format!(
                "Unknown VIDEO_STORE '{}'",
                other
            ))),
        }
    }
}

/// Build the configured store.
pub async fn build_store(config: StoreConfig) -> StorageResult<Arc<dyn VideoStore>> {
    match config {
        StoreConfig::Local { upload_dir } => {
            Ok(Arc::new(LocalVideoStore::new(upload_dir).await?))
        }
        StoreConfig::R2(config) => {
            info!("Using R2 bucket {}", config.bucket_name);
            Ok(Arc::new(R2VideoStore::new(config)))
        }
    }
}
