//! Application state.

use std::sync::Arc;
use std::time::Instant;

use vguard_classifier::{ContentClassifier, HttpClassifier};
use vguard_events::ProgressBroadcaster;
use vguard_metadata::{MemoryVideoRepository, VideoRepository};
use vguard_models::LabelPolicy;
use vguard_storage::{build_store, StoreConfig, VideoStore};
use vguard_worker::{label_policy_from_env, Orchestrator, OrchestratorConfig, Tombstones};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;
use crate::services::{StreamingService, VideoService};

/// External collaborators the core runs against.
pub struct Collaborators {
    pub repository: Arc<dyn VideoRepository>,
    pub store: Arc<dyn VideoStore>,
    pub classifier: Arc<dyn ContentClassifier>,
    pub policy: LabelPolicy,
    pub orchestrator: OrchestratorConfig,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub repository: Arc<dyn VideoRepository>,
    pub store: Arc<dyn VideoStore>,
    pub broadcaster: Arc<ProgressBroadcaster>,
    pub orchestrator: Orchestrator,
    pub tombstones: Arc<Tombstones>,
    pub verifier: Arc<JwtVerifier>,
    pub videos: VideoService,
    pub streaming: StreamingService,
    pub started_at: Instant,
}

impl AppState {
    /// Create application state from environment configuration.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = build_store(StoreConfig::from_env()?).await?;
        let classifier = Arc::new(HttpClassifier::from_env()?);
        let policy = label_policy_from_env()?;

        Self::with_collaborators(
            config,
            Collaborators {
                repository: Arc::new(MemoryVideoRepository::new()),
                store,
                classifier,
                policy,
                orchestrator: OrchestratorConfig::from_env(),
            },
        )
    }

    /// Wire the services around already-built collaborators.
    pub fn with_collaborators(config: ApiConfig, deps: Collaborators) -> anyhow::Result<Self> {
        let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret)?);
        let broadcaster = Arc::new(ProgressBroadcaster::default());
        let tombstones = Arc::new(Tombstones::new());

        let orchestrator = Orchestrator::new(
            Arc::clone(&deps.repository),
            deps.classifier,
            Arc::clone(&broadcaster),
            deps.policy,
            deps.orchestrator,
        );
        let videos = VideoService::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.store),
            orchestrator.clone(),
            Arc::clone(&tombstones),
            config.max_upload_bytes,
        );
        let streaming = StreamingService::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.store),
            config.stream_chunk_bytes,
        );

        Ok(Self {
            config,
            repository: deps.repository,
            store: deps.store,
            broadcaster,
            orchestrator,
            tombstones,
            verifier,
            videos,
            streaming,
            started_at: Instant::now(),
        })
    }
}
