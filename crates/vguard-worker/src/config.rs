//! Orchestrator and sweeper configuration.

use std::time::Duration;

use vguard_models::LabelPolicy;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Processing orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pacing between synthetic progress checkpoints
    pub checkpoint_interval: Duration,
    /// Upper bound on one classifier call
    pub classifier_timeout: Duration,
    /// Retries for a failed metadata write (not counting the first attempt)
    pub persist_max_retries: u32,
    /// Base delay for persistence retry backoff
    pub persist_retry_base: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_millis(2000),
            classifier_timeout: Duration::from_secs(300), // 5 minutes
            persist_max_retries: 3,
            persist_retry_base: Duration::from_millis(100),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            checkpoint_interval: std::env::var("PROCESSING_CHECKPOINT_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.checkpoint_interval),
            classifier_timeout: std::env::var("CLASSIFIER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.classifier_timeout),
            persist_max_retries: std::env::var("PERSIST_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.persist_max_retries),
            persist_retry_base: std::env::var("PERSIST_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.persist_retry_base),
        }
    }
}

/// Orphan sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweep cycles
    pub interval: Duration,
    /// Unreferenced objects younger than this are left alone
    pub orphan_grace: Duration,
    pub enabled: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            orphan_grace: Duration::from_secs(3600), // 1 hour
            enabled: true,
        }
    }
}

impl SweeperConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            orphan_grace: std::env::var("SWEEP_ORPHAN_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.orphan_grace),
            enabled: std::env::var("ENABLE_ORPHAN_SWEEP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.enabled),
        }
    }
}

fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load the block-set / caution-set partition.
///
/// `LABEL_POLICY_PATH` (JSON `{"block": [...], "caution": [...]}`) wins;
/// otherwise `BLOCK_LABELS` / `CAUTION_LABELS` override the built-in sets
/// individually.
pub fn label_policy_from_env() -> OrchestratorResult<LabelPolicy> {
    if let Ok(path) = std::env::var("LABEL_POLICY_PATH") {
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::config_error(format!("Failed to read {}: {}", path, e))
        })?;
        return serde_json::from_str(&raw).map_err(|e| {
            OrchestratorError::config_error(format!("Invalid label policy {}: {}", path, e))
        });
    }

    let defaults = LabelPolicy::default();
    let block = std::env::var("BLOCK_LABELS")
        .map(|raw| split_labels(&raw))
        .unwrap_or_else(|_| defaults.block_labels().iter().cloned().collect());
    let caution = std::env::var("CAUTION_LABELS")
        .map(|raw| split_labels(&raw))
        .unwrap_or_else(|_| defaults.caution_labels().iter().cloned().collect());

    Ok(LabelPolicy::new(block, caution))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_labels_trims_and_skips_empty() {
        assert_eq!(
            split_labels(" Weapons, Violence ,,Gore"),
            vec!["Weapons", "Violence", "Gore"]
        );
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.classifier_timeout, Duration::from_secs(300));
        assert_eq!(config.persist_max_retries, 3);
        assert!(SweeperConfig::default().enabled);
    }
}
