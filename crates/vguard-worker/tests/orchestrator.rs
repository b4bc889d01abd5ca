//! Processing orchestrator behaviour against in-memory collaborators.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use vguard_classifier::{ClassifierError, ClassifierResult, ContentClassifier, LabelSet};
use vguard_events::{Channel, ListenerHandle, ProgressBroadcaster};
use vguard_metadata::{MemoryVideoRepository, RepositoryError, RepositoryResult, VideoRepository};
use vguard_models::{
    EventKind, LabelPolicy, LifecycleError, LifecycleState, ProgressEvent, SafetyVerdict, Video,
    VideoId, VideoUpdate,
};
use vguard_worker::{Orchestrator, OrchestratorConfig, OrchestratorError, RunOutcome};

type Reply = ClassifierResult<LabelSet>;

/// Classifier whose answers are handed out in call order by the test.
#[derive(Default)]
struct ScriptedClassifier {
    replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    fn reply(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(rx);
        tx
    }

    fn answer(&self, reply: Reply) {
        let _ = self.reply().send(reply);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentClassifier for ScriptedClassifier {
    async fn classify(&self, _storage_key: &str) -> ClassifierResult<LabelSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ClassifierError::transient("reply dropped"))),
            None => std::future::pending().await,
        }
    }
}

/// Repository that fails progress writes on demand and can hold a
/// committed re-queue before returning it.
#[derive(Default)]
struct FlakyRepository {
    inner: MemoryVideoRepository,
    progress_failures: AtomicU32,
    requeue_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl VideoRepository for FlakyRepository {
    async fn create(&self, video: Video) -> RepositoryResult<()> {
        self.inner.create(video).await
    }

    async fn get(&self, id: &VideoId) -> RepositoryResult<Option<Video>> {
        self.inner.get(id).await
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        status: Option<LifecycleState>,
    ) -> RepositoryResult<Vec<Video>> {
        self.inner.list_by_owner(owner_id, status).await
    }

    async fn list_all(&self, status: Option<LifecycleState>) -> RepositoryResult<Vec<Video>> {
        self.inner.list_all(status).await
    }

    async fn apply_update(
        &self,
        id: &VideoId,
        expected_run: Option<u64>,
        update: VideoUpdate,
    ) -> RepositoryResult<Video> {
        if matches!(update, VideoUpdate::Progress { .. }) {
            let remaining = self.progress_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.progress_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RepositoryError::unavailable("connection reset"));
            }
        }
        let is_requeue = matches!(update, VideoUpdate::Requeue);
        let video = self.inner.apply_update(id, expected_run, update).await?;
        if is_requeue {
            let gate = self.requeue_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        }
        Ok(video)
    }

    async fn delete(&self, id: &VideoId) -> RepositoryResult<bool> {
        self.inner.delete(id).await
    }

    async fn storage_keys(&self) -> RepositoryResult<HashSet<String>> {
        self.inner.storage_keys().await
    }

    async fn check_connectivity(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

struct Harness {
    repository: Arc<FlakyRepository>,
    classifier: Arc<ScriptedClassifier>,
    broadcaster: Arc<ProgressBroadcaster>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new() -> Self {
        let repository = Arc::new(FlakyRepository::default());
        let classifier = Arc::new(ScriptedClassifier::default());
        let broadcaster = Arc::new(ProgressBroadcaster::new(256));
        let orchestrator = Orchestrator::new(
            repository.clone(),
            classifier.clone(),
            broadcaster.clone(),
            LabelPolicy::new(["Weapons", "Violence"], ["Suggestive"]),
            OrchestratorConfig {
                checkpoint_interval: Duration::from_secs(1),
                classifier_timeout: Duration::from_secs(30),
                persist_max_retries: 2,
                persist_retry_base: Duration::from_millis(10),
            },
        );
        Self {
            repository,
            classifier,
            broadcaster,
            orchestrator,
        }
    }

    async fn upload(&self, id: &str) -> VideoId {
        let video_id = VideoId::from(id);
        self.repository
            .create(Video::new(
                video_id.clone(),
                "alice",
                format!("alice/{id}.mp4"),
                "Clip",
                "clip.mp4",
                10_485_760,
            ))
            .await
            .unwrap();
        video_id
    }

    fn listen(&self, owner: &str) -> ListenerHandle {
        let handle = self.broadcaster.register();
        self.broadcaster.join(handle.id, Channel::owner(owner));
        handle
    }

    async fn video(&self, id: &VideoId) -> Video {
        self.repository.require(id).await.unwrap()
    }
}

fn labels(names: &[&str]) -> LabelSet {
    names.iter().map(|s| s.to_string()).collect()
}

fn drain(listener: &mut ListenerHandle) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = listener.receiver.try_recv() {
        events.push(event);
    }
    events
}

fn percents(events: &[ProgressEvent]) -> Vec<u8> {
    events.iter().filter_map(ProgressEvent::percent).collect()
}

#[tokio::test(start_paused = true)]
async fn test_safe_run_emits_all_checkpoints_in_order() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let mut listener = h.listen("alice");
    h.classifier.answer(Ok(labels(&["Safe Scene"])));

    let ticket = h.orchestrator.start_processing(&id).await.unwrap();
    assert_eq!(ticket.run_seq, 1);

    let outcome = ticket.outcome().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            state: LifecycleState::Ready,
            verdict: SafetyVerdict::Safe
        }
    );

    let events = drain(&mut listener);
    assert_eq!(events.first().map(|e| &e.kind), Some(&EventKind::Started));
    assert_eq!(percents(&events), vec![0, 25, 50, 75, 100]);
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(EventKind::Completed {
            verdict: SafetyVerdict::Safe,
            state: LifecycleState::Ready,
            advisory: false
        })
    ));
    assert!(events.iter().all(|e| e.video_id == id && e.run_seq == 1));

    let video = h.video(&id).await;
    assert!(video.is_streamable());
    assert_eq!(video.progress_percent, 100);
    assert!(!h.orchestrator.is_in_flight(&id));
}

#[tokio::test(start_paused = true)]
async fn test_block_label_wins_over_caution_label() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let mut listener = h.listen("alice");
    h.classifier.answer(Ok(labels(&["Suggestive", "Weapons"])));

    let outcome = h
        .orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            state: LifecycleState::Blocked,
            verdict: SafetyVerdict::Flagged
        }
    );
    let events = drain(&mut listener);
    assert_eq!(percents(&events), vec![0, 25, 50, 75, 100]);
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(EventKind::Completed {
            verdict: SafetyVerdict::Flagged,
            state: LifecycleState::Blocked,
            advisory: false
        })
    ));

    let video = h.video(&id).await;
    assert_eq!(video.lifecycle_state, LifecycleState::Blocked);
    assert_eq!(video.current_verdict().unwrap().matched_labels, vec!["Weapons"]);
}

#[tokio::test(start_paused = true)]
async fn test_caution_label_is_streamable_with_advisory() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let mut listener = h.listen("alice");
    h.classifier.answer(Ok(labels(&["Suggestive"])));

    h.orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    let video = h.video(&id).await;
    assert!(video.is_streamable());
    assert!(video.has_advisory());
    assert!(drain(&mut listener).iter().any(|e| matches!(
        e.kind,
        EventKind::Completed { advisory: true, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_classifier_error_fails_run_without_reaching_100() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let mut listener = h.listen("alice");
    h.classifier
        .answer(Err(ClassifierError::permanent("unsupported codec")));

    let outcome = h
        .orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Failed { ref reason } if reason.contains("unsupported codec")));

    let events = drain(&mut listener);
    assert!(!percents(&events).contains(&100));
    assert!(matches!(events.last().map(|e| &e.kind), Some(EventKind::Failed { .. })));

    let video = h.video(&id).await;
    assert_eq!(video.lifecycle_state, LifecycleState::Failed);
    assert_eq!(video.safety_verdict(), Some(SafetyVerdict::Undetermined));
    assert!(video.failure_reason.unwrap().contains("unsupported codec"));
}

#[tokio::test(start_paused = true)]
async fn test_classifier_timeout_fails_run() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    // No scripted reply: the classifier never answers

    let outcome = h
        .orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { ref reason } if reason.contains("timed out")));
    assert_eq!(h.video(&id).await.lifecycle_state, LifecycleState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_trigger_is_rejected_and_runs_once() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    h.classifier.answer(Ok(labels(&["Safe Scene"])));

    let first = h.orchestrator.start_processing(&id).await.unwrap();
    let second = h.orchestrator.start_processing(&id).await.unwrap_err();
    assert!(second.is_already_processing());

    first.outcome().await.unwrap();
    assert_eq!(h.classifier.calls(), 1);
    assert_eq!(h.video(&id).await.verdicts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_video_needs_requeue() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    h.classifier
        .answer(Err(ClassifierError::transient("throttled")));
    h.orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    let err = h.orchestrator.start_processing(&id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidState {
            state: LifecycleState::Failed
        }
    ));

    h.classifier.answer(Ok(labels(&["Safe Scene"])));
    let ticket = h.orchestrator.requeue(&id, None).await.unwrap();
    assert_eq!(ticket.run_seq, 2);
    ticket.outcome().await.unwrap();

    let video = h.video(&id).await;
    assert_eq!(video.lifecycle_state, LifecycleState::Ready);
    assert!(video.failure_reason.is_none());
    assert_eq!(video.verdicts.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_requeue_supersedes_in_flight_run() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let first_reply = h.classifier.reply();
    let second_reply = h.classifier.reply();

    let first = h.orchestrator.start_processing(&id).await.unwrap();
    while h.classifier.calls() < 1 {
        tokio::task::yield_now().await;
    }

    let second = h.orchestrator.requeue(&id, None).await.unwrap();
    assert_eq!(second.run_seq, 2);

    second_reply.send(Ok(labels(&["Weapons"]))).unwrap();
    assert_eq!(
        second.outcome().await.unwrap(),
        RunOutcome::Completed {
            state: LifecycleState::Blocked,
            verdict: SafetyVerdict::Flagged
        }
    );

    // The stale run's answer arrives late and must be discarded
    let _ = first_reply.send(Ok(labels(&["Safe Scene"])));
    assert_eq!(first.outcome().await.unwrap(), RunOutcome::Superseded);

    let video = h.video(&id).await;
    assert_eq!(video.run_seq, 2);
    assert_eq!(video.lifecycle_state, LifecycleState::Blocked);
    assert!(video.verdicts.iter().all(|v| v.run_seq == 2));
    assert!(!h.orchestrator.is_in_flight(&id));
}

#[tokio::test(start_paused = true)]
async fn test_requeue_joins_run_started_by_concurrent_trigger() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    h.classifier
        .answer(Err(ClassifierError::permanent("unsupported codec")));
    h.orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    let (release, gate) = oneshot::channel();
    *h.repository.requeue_gate.lock().unwrap() = Some(gate);
    let orchestrator = h.orchestrator.clone();
    let requeue_id = id.clone();
    let requeue =
        tokio::spawn(async move { orchestrator.requeue(&requeue_id, Some(1)).await });

    while h.video(&id).await.run_seq < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.video(&id).await.lifecycle_state, LifecycleState::Pending);

    // A plain trigger lands between the re-queue commit and its own trigger
    let reply = h.classifier.reply();
    let winner = h.orchestrator.start_processing(&id).await.unwrap();
    assert!(winner.owns_run());
    release.send(()).unwrap();

    let joined = requeue.await.unwrap().unwrap();
    assert!(!joined.owns_run());
    assert_eq!(joined.run_seq, 2);
    assert!(joined.outcome().await.is_none());

    reply.send(Ok(labels(&["Safe Scene"]))).unwrap();
    assert!(matches!(
        winner.outcome().await.unwrap(),
        RunOutcome::Completed { .. }
    ));
    assert_eq!(h.classifier.calls(), 2);
    assert_eq!(h.video(&id).await.verdicts.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_requeue_is_rejected() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    h.classifier
        .answer(Err(ClassifierError::permanent("unsupported codec")));
    h.orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();
    let _pending = h.classifier.reply();
    h.orchestrator.requeue(&id, Some(1)).await.unwrap();

    let err = h.orchestrator.requeue(&id, Some(1)).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Repository(RepositoryError::Lifecycle(LifecycleError::StaleRun {
            expected: 1,
            current: 2
        }))
    ));
    assert_eq!(h.video(&id).await.run_seq, 2);
}

/// Classifier that panics mid-run.
struct PanickingClassifier;

#[async_trait]
impl ContentClassifier for PanickingClassifier {
    async fn classify(&self, _storage_key: &str) -> ClassifierResult<LabelSet> {
        panic!("classifier crashed");
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_run_releases_in_flight_slot() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let orchestrator = Orchestrator::new(
        h.repository.clone(),
        Arc::new(PanickingClassifier),
        h.broadcaster.clone(),
        LabelPolicy::new(["Weapons"], ["Suggestive"]),
        OrchestratorConfig {
            checkpoint_interval: Duration::from_secs(1),
            classifier_timeout: Duration::from_secs(30),
            persist_max_retries: 2,
            persist_retry_base: Duration::from_millis(10),
        },
    );

    let ticket = orchestrator.start_processing(&id).await.unwrap();
    assert!(orchestrator.is_in_flight(&id));
    assert!(ticket.outcome().await.is_none());
    assert!(!orchestrator.is_in_flight(&id));
    assert_eq!(orchestrator.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_persistence_errors_are_retried() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    h.repository.progress_failures.store(2, Ordering::SeqCst);
    h.classifier.answer(Ok(labels(&["Safe Scene"])));

    let outcome = h
        .orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(h.video(&id).await.lifecycle_state, LifecycleState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_persistence_retries_fail_the_run() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let mut listener = h.listen("alice");
    h.repository.progress_failures.store(100, Ordering::SeqCst);
    h.classifier.answer(Ok(labels(&["Safe Scene"])));

    let outcome = h
        .orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::PersistFailed { .. }));
    let video = h.video(&id).await;
    assert_eq!(video.lifecycle_state, LifecycleState::Failed);
    assert!(video.failure_reason.unwrap().contains("persist"));
    assert!(matches!(
        drain(&mut listener).last().map(|e| &e.kind),
        Some(EventKind::Failed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_other_owners_receive_nothing() {
    let h = Harness::new();
    let id = h.upload("v1").await;
    let mut bob = h.listen("bob");
    let mut admin = h.broadcaster.register();
    h.broadcaster.join(admin.id, Channel::Admins);
    h.classifier.answer(Ok(labels(&["Safe Scene"])));

    h.orchestrator
        .start_processing(&id)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert!(drain(&mut bob).is_empty());
    assert_eq!(percents(&drain(&mut admin)), vec![0, 25, 50, 75, 100]);
}
