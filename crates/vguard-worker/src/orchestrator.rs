//! Processing orchestrator.
//!
//! Drives one video at a time through `Pending -> Processing -> terminal`
//! on a background task. The caller gets a [`RunTicket`] back immediately.
//!
//! Two mechanisms keep runs from stepping on each other:
//! - an in-flight table keyed by video id, holding the run sequence number
//!   of the active run, rejects duplicate triggers before any task is spawned;
//! - every metadata write carries the run sequence number, so once a
//!   re-queue bumps it the older run's writes are rejected as stale and the
//!   run stops without publishing anything further.

use std::sync::Arc;
use std::time::Instant as StdInstant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::Instrument;

use vguard_classifier::{ClassifierError, ClassifierResult, ContentClassifier, LabelSet};
use vguard_events::ProgressBroadcaster;
use vguard_metadata::{RepositoryError, RepositoryResult, VideoRepository};
use vguard_models::{
    LabelPolicy, LifecycleState, ProgressEvent, SafetyVerdict, Video, VideoId, VideoUpdate,
    PROGRESS_CHECKPOINTS,
};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::logging::RunLogger;
use crate::metrics;
use crate::retry::{retry_async_if, RetryConfig};

/// How a processing run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Classification finished and the terminal state was committed
    Completed {
        state: LifecycleState,
        verdict: SafetyVerdict,
    },
    /// Classification failed and `Failed` was committed
    Failed { reason: String },
    /// A re-queue replaced this run; nothing more was written
    Superseded,
    /// The video was no longer claimable when the run started
    ClaimRejected,
    /// A metadata write failed after all retries
    PersistFailed { reason: String },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Superseded => "superseded",
            RunOutcome::ClaimRejected => "claim_rejected",
            RunOutcome::PersistFailed { .. } => "persist_failed",
        }
    }
}

/// Handle to a scheduled run.
#[derive(Debug)]
pub struct RunTicket {
    pub video_id: VideoId,
    pub run_seq: u64,
    /// `None` when another caller scheduled this run
    handle: Option<JoinHandle<RunOutcome>>,
}

impl RunTicket {
    /// Whether this ticket's caller spawned the run.
    pub fn owns_run(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the run to finish. `None` if the task panicked or was
    /// aborted, or if the run belongs to another caller.
    pub async fn outcome(self) -> Option<RunOutcome> {
        match self.handle {
            Some(handle) => handle.await.ok(),
            None => None,
        }
    }
}

/// Schedules and drives processing runs.
#[derive(Clone)]
pub struct Orchestrator {
    repository: Arc<dyn VideoRepository>,
    classifier: Arc<dyn ContentClassifier>,
    broadcaster: Arc<ProgressBroadcaster>,
    policy: Arc<LabelPolicy>,
    config: OrchestratorConfig,
    in_flight: Arc<DashMap<VideoId, u64>>,
}

impl Orchestrator {
    pub fn new(
        repository: Arc<dyn VideoRepository>,
        classifier: Arc<dyn ContentClassifier>,
        broadcaster: Arc<ProgressBroadcaster>,
        policy: LabelPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            classifier,
            broadcaster,
            policy: Arc::new(policy),
            config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn policy(&self) -> &LabelPolicy {
        &self.policy
    }

    /// Whether a run for this video is currently in flight.
    pub fn is_in_flight(&self, video_id: &VideoId) -> bool {
        self.in_flight.contains_key(video_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Schedule a processing run and return without waiting for it.
    ///
    /// Fails with `AlreadyProcessing` when a run for the current run
    /// sequence number is already in flight (or the video is already
    /// `Processing`), and with `InvalidState` for terminal videos.
    pub async fn start_processing(&self, video_id: &VideoId) -> OrchestratorResult<RunTicket> {
        let video = self.repository.require(video_id).await?;
        let run_seq = video.run_seq;

        match video.lifecycle_state {
            LifecycleState::Pending => {}
            LifecycleState::Processing => {
                metrics::record_duplicate_trigger();
                return Err(OrchestratorError::AlreadyProcessing {
                    video_id: video_id.to_string(),
                    run_seq,
                });
            }
            state => return Err(OrchestratorError::InvalidState { state }),
        }

        match self.in_flight.entry(video_id.clone()) {
            Entry::Occupied(mut active) => {
                if *active.get() >= run_seq {
                    metrics::record_duplicate_trigger();
                    return Err(OrchestratorError::AlreadyProcessing {
                        video_id: video_id.to_string(),
                        run_seq: *active.get(),
                    });
                }
                // Left over from a run a re-queue superseded
                active.insert(run_seq);
            }
            Entry::Vacant(slot) => {
                slot.insert(run_seq);
            }
        }
        metrics::set_runs_in_flight(self.in_flight.len());

        let logger = RunLogger::new(video_id, run_seq);
        let span = logger.create_span();
        let this = self.clone();
        let id = video_id.clone();
        let handle = tokio::spawn(async move { this.run(id, run_seq, logger).await }.instrument(span));

        Ok(RunTicket {
            video_id: video_id.clone(),
            run_seq,
            handle: Some(handle),
        })
    }

    /// Re-queue a video: start a new run sequence and schedule it.
    ///
    /// Any run still in flight for the old sequence number is superseded.
    ///
    /// With `expected_run` set, the re-queue only commits if the video is
    /// still on that run; a concurrent re-queue makes it fail as stale.
    /// A trigger that beats this call to the new run is not an error: the
    /// returned ticket then does not own the run.
    pub async fn requeue(
        &self,
        video_id: &VideoId,
        expected_run: Option<u64>,
    ) -> OrchestratorResult<RunTicket> {
        let video = self
            .repository
            .apply_update(video_id, expected_run, VideoUpdate::Requeue)
            .await?;
        tracing::info!(
            video_id = %video_id,
            run_seq = video.run_seq,
            "Video re-queued"
        );
        match self.start_processing(video_id).await {
            Err(OrchestratorError::AlreadyProcessing { run_seq, .. })
                if run_seq >= video.run_seq =>
            {
                Ok(RunTicket {
                    video_id: video_id.clone(),
                    run_seq,
                    handle: None,
                })
            }
            other => other,
        }
    }

    async fn run(self, video_id: VideoId, run_seq: u64, logger: RunLogger) -> RunOutcome {
        let started = StdInstant::now();
        metrics::record_run_started();

        // Released on every exit, including a panic inside the run
        let in_flight = Arc::clone(&self.in_flight);
        let release_id = video_id.clone();
        let _release = scopeguard::guard((), move |_| {
            in_flight.remove_if(&release_id, |_, active| *active == run_seq);
            metrics::set_runs_in_flight(in_flight.len());
        });

        let outcome = self.drive(&video_id, run_seq, &logger).await;

        metrics::record_run_finished(outcome.label(), started.elapsed().as_secs_f64());

        match &outcome {
            RunOutcome::Completed { state, verdict } => {
                logger.log_completion(&format!("state={} verdict={}", state, verdict))
            }
            RunOutcome::Failed { reason } => logger.log_warning(&format!("failed: {}", reason)),
            RunOutcome::Superseded => logger.log_warning("superseded by a newer run"),
            RunOutcome::ClaimRejected => logger.log_warning("video was no longer pending"),
            RunOutcome::PersistFailed { reason } => logger.log_error(reason),
        }
        outcome
    }

    async fn drive(&self, video_id: &VideoId, run_seq: u64, logger: &RunLogger) -> RunOutcome {
        let video = match self.persist(video_id, run_seq, VideoUpdate::Claim).await {
            Ok(video) => video,
            Err(e) if e.is_stale() => return RunOutcome::Superseded,
            Err(RepositoryError::Lifecycle(_)) | Err(RepositoryError::NotFound(_)) => {
                return RunOutcome::ClaimRejected
            }
            Err(e) => {
                return RunOutcome::PersistFailed {
                    reason: format!("failed to claim video: {}", e),
                }
            }
        };

        logger.log_start(&video.storage_key);
        let owner_id = video.owner_id.clone();
        self.publish(&owner_id, ProgressEvent::started(video_id, &owner_id, run_seq));
        self.publish(
            &owner_id,
            ProgressEvent::progress(video_id, &owner_id, run_seq, PROGRESS_CHECKPOINTS[0]),
        );

        let classify = self.classify(&video);
        tokio::pin!(classify);

        // Intermediate checkpoints are paced evenly while the classifier runs
        let paced_from = Instant::now();
        let mut labels: Option<ClassifierResult<LabelSet>> = None;
        let intermediate = &PROGRESS_CHECKPOINTS[1..PROGRESS_CHECKPOINTS.len() - 1];

        for (step, &percent) in intermediate.iter().enumerate() {
            let tick = paced_from + self.config.checkpoint_interval * (step as u32 + 1);

            if labels.is_none() {
                tokio::select! {
                    result = &mut classify => labels = Some(result),
                    _ = sleep_until(tick) => {}
                }
            }
            if matches!(labels, Some(Err(_))) {
                break;
            }
            sleep_until(tick).await;

            match self
                .persist(video_id, run_seq, VideoUpdate::Progress { percent })
                .await
            {
                Ok(_) => {
                    logger.log_progress(&format!("{}%", percent));
                    self.publish(
                        &owner_id,
                        ProgressEvent::progress(video_id, &owner_id, run_seq, percent),
                    );
                }
                Err(e) => return self.abort_on_persist_error(&owner_id, video_id, run_seq, e).await,
            }
        }

        let labels = match labels {
            Some(labels) => labels,
            None => classify.await,
        };

        match labels {
            Ok(labels) => self.commit_classification(&owner_id, video_id, run_seq, &labels).await,
            Err(e) => self.commit_failure(&owner_id, video_id, run_seq, e.to_string()).await,
        }
    }

    async fn classify(&self, video: &Video) -> ClassifierResult<LabelSet> {
        let limit = self.config.classifier_timeout;
        match timeout(limit, self.classifier.classify(&video.storage_key)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(limit.as_secs())),
        }
    }

    async fn commit_classification(
        &self,
        owner_id: &str,
        video_id: &VideoId,
        run_seq: u64,
        labels: &LabelSet,
    ) -> RunOutcome {
        let assessment = self.policy.assess(labels);
        let advisory = assessment.is_advisory();

        match self
            .persist(video_id, run_seq, VideoUpdate::Classified { assessment })
            .await
        {
            Ok(video) => {
                let verdict = video.safety_verdict().unwrap_or(SafetyVerdict::Undetermined);
                let state = video.lifecycle_state;
                self.publish(
                    owner_id,
                    ProgressEvent::progress(video_id, owner_id, run_seq, 100),
                );
                self.publish(
                    owner_id,
                    ProgressEvent::completed(video_id, owner_id, run_seq, verdict, state, advisory),
                );
                RunOutcome::Completed { state, verdict }
            }
            Err(e) => self.abort_on_persist_error(owner_id, video_id, run_seq, e).await,
        }
    }

    async fn commit_failure(
        &self,
        owner_id: &str,
        video_id: &VideoId,
        run_seq: u64,
        reason: String,
    ) -> RunOutcome {
        match self
            .persist(
                video_id,
                run_seq,
                VideoUpdate::ClassificationFailed {
                    reason: reason.clone(),
                },
            )
            .await
        {
            Ok(_) => {
                self.publish(
                    owner_id,
                    ProgressEvent::failed(video_id, owner_id, run_seq, reason.clone()),
                );
                RunOutcome::Failed { reason }
            }
            Err(e) if e.is_stale() => RunOutcome::Superseded,
            Err(e) => RunOutcome::PersistFailed {
                reason: format!("failed to record classification failure: {}", e),
            },
        }
    }

    /// A write failed after retries. Stale runs stop quietly; anything else
    /// marks the run `Failed` (best effort) rather than carrying on.
    async fn abort_on_persist_error(
        &self,
        owner_id: &str,
        video_id: &VideoId,
        run_seq: u64,
        error: RepositoryError,
    ) -> RunOutcome {
        if error.is_stale() {
            return RunOutcome::Superseded;
        }

        let reason = format!("failed to persist run state: {}", error);
        match self
            .repository
            .apply_update(
                video_id,
                Some(run_seq),
                VideoUpdate::ClassificationFailed {
                    reason: reason.clone(),
                },
            )
            .await
        {
            Ok(_) => {
                self.publish(
                    owner_id,
                    ProgressEvent::failed(video_id, owner_id, run_seq, reason.clone()),
                );
            }
            Err(e) if e.is_stale() => return RunOutcome::Superseded,
            Err(e) => {
                tracing::error!(
                    video_id = %video_id,
                    run_seq,
                    "Could not mark run as failed: {}", e
                );
            }
        }
        RunOutcome::PersistFailed { reason }
    }

    /// Apply one run-guarded update, retrying transient repository errors.
    async fn persist(
        &self,
        video_id: &VideoId,
        run_seq: u64,
        update: VideoUpdate,
    ) -> RepositoryResult<Video> {
        let name = update.name();
        let config = RetryConfig::new(name)
            .with_max_retries(self.config.persist_max_retries)
            .with_base_delay(self.config.persist_retry_base);

        let result = retry_async_if(
            &config,
            || {
                self.repository
                    .apply_update(video_id, Some(run_seq), update.clone())
            },
            RepositoryError::is_retryable,
        )
        .await
        .into_result();

        if let Err(e) = &result {
            if !e.is_stale() {
                metrics::record_persist_failure(name);
            }
        }
        result
    }

    fn publish(&self, owner_id: &str, event: ProgressEvent) {
        self.broadcaster.publish(owner_id, &event);
    }
}
