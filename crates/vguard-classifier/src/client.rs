//! HTTP moderation service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ClassifierError, ClassifierResult};
use crate::{ContentClassifier, LabelSet};

/// Classifier client configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the moderation service
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Labels below this confidence (0-100) are ignored
    pub min_confidence: f32,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            api_key: None,
            min_confidence: 60.0,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl ClassifierConfig {
    /// Create config from environment variables. `CLASSIFIER_URL` is required.
    pub fn from_env() -> ClassifierResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            base_url: std::env::var("CLASSIFIER_URL")
                .map_err(|_| ClassifierError::config_error("CLASSIFIER_URL not set"))?,
            api_key: std::env::var("CLASSIFIER_API_KEY").ok().filter(|k| !k.is_empty()),
            min_confidence: std::env::var("CLASSIFIER_MIN_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_confidence),
            request_timeout: std::env::var("CLASSIFIER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModerateRequest<'a> {
    storage_key: &'a str,
    min_confidence: f32,
}

#[derive(Debug, Deserialize)]
struct ModerateResponse {
    #[serde(default)]
    labels: Vec<ModerationLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModerationLabel {
    name: String,
    confidence: f32,
    #[serde(default)]
    parent_name: Option<String>,
}

/// Calls `POST {base_url}/v1/moderate`.
pub struct HttpClassifier {
    config: ClassifierConfig,
    client: Client,
}

impl HttpClassifier {
    pub fn new(config: ClassifierConfig) -> ClassifierResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClassifierError::config_error(e.to_string()))?;

        info!("Content classifier at {}", config.base_url);
        Ok(Self { config, client })
    }

    pub fn from_env() -> ClassifierResult<Self> {
        Self::new(ClassifierConfig::from_env()?)
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/moderate", self.config.base_url.trim_end_matches('/'))
    }

    /// Names and parent names of labels at or above the threshold.
    fn collect_labels(&self, labels: Vec<ModerationLabel>) -> LabelSet {
        let mut set = LabelSet::new();
        for label in labels {
            if label.confidence < self.config.min_confidence {
                continue;
            }
            if let Some(parent) = label.parent_name.filter(|p| !p.is_empty()) {
                set.insert(parent);
            }
            set.insert(label.name);
        }
        set
    }
}

#[async_trait]
impl ContentClassifier for HttpClassifier {
    async fn classify(&self, storage_key: &str) -> ClassifierResult<LabelSet> {
        debug!(storage_key = %storage_key, "Requesting moderation labels");

        let mut request = self.client.post(self.endpoint()).json(&ModerateRequest {
            storage_key,
            min_confidence: self.config.min_confidence,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("moderation service returned {}: {}", status, body.trim());
            warn!(storage_key = %storage_key, "{}", message);

            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    ClassifierError::transient(message)
                } else {
                    ClassifierError::permanent(message)
                },
            );
        }

        let body: ModerateResponse = response.json().await?;
        let labels = self.collect_labels(body.labels);
        debug!(storage_key = %storage_key, count = labels.len(), "Received moderation labels");
        Ok(labels)
    }
}
