//! HTTP surface tests against in-memory metadata and a temp-dir store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use vguard_api::{create_router, ApiConfig, AppState, Collaborators};
use vguard_classifier::{ClassifierResult, ContentClassifier, LabelSet};
use vguard_events::Channel;
use vguard_metadata::MemoryVideoRepository;
use vguard_models::{EventKind, LabelPolicy, ProgressEvent, Role};
use vguard_storage::LocalVideoStore;
use vguard_worker::OrchestratorConfig;

const BOUNDARY: &str = "vguard-test-boundary";

/// Answers every call with the same labels, or never answers.
struct FixedClassifier {
    labels: Option<LabelSet>,
}

#[async_trait]
impl ContentClassifier for FixedClassifier {
    async fn classify(&self, _storage_key: &str) -> ClassifierResult<LabelSet> {
        match &self.labels {
            Some(labels) => Ok(labels.clone()),
            None => std::future::pending().await,
        }
    }
}

struct TestApp {
    _dir: tempfile::TempDir,
    state: AppState,
    router: Router,
}

impl TestApp {
    async fn new(labels: Option<&[&str]>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalVideoStore::new(dir.path()).await.unwrap());
        let classifier = Arc::new(FixedClassifier {
            labels: labels.map(|l| l.iter().map(|s| s.to_string()).collect()),
        });
        let config = ApiConfig {
            jwt_secret: "integration-test-secret".to_string(),
            ..ApiConfig::default()
        };
        let state = AppState::with_collaborators(
            config,
            Collaborators {
                repository: Arc::new(MemoryVideoRepository::new()),
                store,
                classifier,
                policy: LabelPolicy::new(["Weapons", "Violence"], ["Suggestive"]),
                orchestrator: OrchestratorConfig {
                    checkpoint_interval: Duration::from_millis(5),
                    ..OrchestratorConfig::default()
                },
            },
        )
        .unwrap();
        let router = create_router(state.clone(), None);
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    fn token(&self, user: &str, role: Role) -> String {
        self.state.verifier.issue_token(user, role, 3600).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn upload(&self, token: &str, filename: &str, data: &[u8]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/videos/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body("My clip", filename, data)))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn get_json(&self, token: &str, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.send(authed("GET", uri, token)).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn stream(
        &self,
        token: &str,
        video_id: &str,
        range: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder()
            .uri(format!("/api/videos/{}/stream", video_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn wait_state(&self, token: &str, video_id: &str, wanted: &str) {
        for _ in 0..200 {
            let (_, video) = self.get_json(token, &format!("/api/videos/{}", video_id)).await;
            if video["lifecycleState"] == wanted {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("video {} never reached {}", video_id, wanted);
    }

    /// Poll until the video leaves pending/processing.
    async fn wait_settled(&self, token: &str, video_id: &str) -> Value {
        for _ in 0..200 {
            let (_, video) = self.get_json(token, &format!("/api/videos/{}", video_id)).await;
            let state = video["lifecycleState"].as_str().unwrap_or_default();
            if state != "pending" && state != "processing" {
                return video;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("video {} never settled", video_id);
    }
}

fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn multipart_body(title: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: video/mp4\r\n\r\n",
            b = BOUNDARY,
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::new(Some(&["Safe Scene"])).await;
    let request = Request::builder()
        .uri("/api/videos")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_cannot_upload() {
    let app = TestApp::new(Some(&["Safe Scene"])).await;
    let token = app.token("vera", Role::Viewer);
    let (status, _) = app.upload(&token, "clip.mp4", b"data").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_extension() {
    let app = TestApp::new(Some(&["Safe Scene"])).await;
    let token = app.token("alice", Role::Editor);
    let (status, _) = app.upload(&token, "notes.txt", b"data").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_processes_to_ready_and_streams() {
    let app = TestApp::new(Some(&["Safe Scene"])).await;
    let token = app.token("alice", Role::Editor);
    let data = patterned(4096);

    let (status, video) = app.upload(&token, "clip.mp4", &data).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(video["ownerId"], "alice");
    assert_eq!(video["sizeBytes"], 4096);
    let id = video["id"].as_str().unwrap().to_string();

    let settled = app.wait_settled(&token, &id).await;
    assert_eq!(settled["lifecycleState"], "ready");
    assert_eq!(settled["safetyVerdict"], "safe");
    assert_eq!(settled["streamable"], true);

    let (status, headers, body) = app.stream(&token, &id, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CONTENT_LENGTH], "4096");
    assert_eq!(body, data);

    let (status, headers, body) = app.stream(&token, &id, Some("bytes=100-199")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 100-199/4096");
    assert_eq!(body, &data[100..200]);

    let (status, headers, _) = app.stream(&token, &id, Some("bytes=5000-")).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */4096");
}

#[tokio::test]
async fn test_stream_checks_owner_and_state() {
    let app = TestApp::new(None).await;
    let alice = app.token("alice", Role::Editor);
    let bob = app.token("bob", Role::Editor);

    let (_, video) = app.upload(&alice, "clip.mp4", b"pending bytes").await;
    let id = video["id"].as_str().unwrap().to_string();
    app.wait_state(&alice, &id, "processing").await;

    let (status, _, _) = app.stream(&bob, &id, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app.stream(&alice, &id, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["state"], "processing");
    assert_eq!(error["verdict"], "undetermined");

    let admin = app.token("root", Role::Admin);
    let (status, _) = app.get_json(&admin, &format!("/api/videos/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_blocked_video_is_not_streamable() {
    let app = TestApp::new(Some(&["Weapons"])).await;
    let token = app.token("alice", Role::Editor);
    let (_, video) = app.upload(&token, "clip.mp4", b"bad bytes").await;
    let id = video["id"].as_str().unwrap().to_string();

    let settled = app.wait_settled(&token, &id).await;
    assert_eq!(settled["lifecycleState"], "blocked");
    assert_eq!(settled["safetyVerdict"], "flagged");
    assert_eq!(settled["matchedLabels"], serde_json::json!(["Weapons"]));

    let (status, _, body) = app.stream(&token, &id, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["verdict"], "flagged");
}

#[tokio::test]
async fn test_duplicate_process_trigger_is_accepted() {
    let app = TestApp::new(None).await;
    let token = app.token("alice", Role::Editor);
    let (_, video) = app.upload(&token, "clip.mp4", b"bytes").await;
    let id = video["id"].as_str().unwrap().to_string();

    let (status, _, body) = app
        .send(authed("POST", &format!("/api/videos/{}/process", id), &token))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let trigger: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(trigger["alreadyProcessing"], true);
    assert_eq!(trigger["runSeq"], 1);
    assert_eq!(app.state.orchestrator.in_flight_count(), 1);
}

#[tokio::test]
async fn test_list_is_scoped_to_owner_and_admin_sees_all() {
    let app = TestApp::new(None).await;
    let alice = app.token("alice", Role::Editor);
    let bob = app.token("bob", Role::Editor);
    app.upload(&alice, "a.mp4", b"a").await;
    app.upload(&bob, "b.mp4", b"b").await;

    let (status, list) = app.get_json(&alice, "/api/videos").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert_eq!(list["videos"][0]["ownerId"], "alice");

    let (status, _) = app.get_json(&alice, "/api/admin/videos").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.token("root", Role::Admin);
    let (status, list) = app.get_json(&admin, "/api/admin/videos").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 2);

    let (status, info) = app.get_json(&admin, "/api/admin/system").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["runsInFlight"], 2);
}

#[tokio::test]
async fn test_rename_and_delete() {
    let app = TestApp::new(Some(&["Safe Scene"])).await;
    let token = app.token("alice", Role::Editor);
    let (_, video) = app.upload(&token, "clip.mp4", b"bytes").await;
    let id = video["id"].as_str().unwrap().to_string();
    app.wait_settled(&token, &id).await;

    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/api/videos/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"displayName":"Renamed"}"#))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let renamed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(renamed["displayName"], "Renamed");

    let (status, _, body) = app
        .send(authed("DELETE", &format!("/api/videos/{}", id), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let deleted: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted["success"], true);
    assert_eq!(deleted["pending"], false);

    let (status, _) = app.get_json(&token, &format!("/api/videos/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = app.stream(&token, &id, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let app = TestApp::new(None).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let live: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(live["status"], "alive");
    assert_eq!(live["version"], env!("CARGO_PKG_VERSION"));
    assert!(live["uptimeSecs"].is_u64());

    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let ready: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ready["ready"], true);
    assert_eq!(ready["runsInFlight"], 0);
    assert_eq!(ready["pendingDeletes"], 0);
    let components: Vec<&str> = ready["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["component"].as_str().unwrap())
        .collect();
    assert_eq!(components, vec!["metadata", "video_store"]);
    assert!(ready["components"]
        .as_array()
        .unwrap()
        .iter()
        .all(|c| c["healthy"] == true && c.get("error").is_none()));

    std::fs::remove_dir_all(app._dir.path()).unwrap();
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let ready: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ready["ready"], false);
    assert_eq!(ready["components"][0]["healthy"], true);
    assert_eq!(ready["components"][1]["healthy"], false);
    assert!(ready["components"][1]["error"]
        .as_str()
        .unwrap()
        .contains("Upload dir unavailable"));
}

#[tokio::test]
async fn test_invalid_video_id_is_bad_request() {
    let app = TestApp::new(None).await;
    let token = app.token("alice", Role::Editor);
    let (status, _) = app.get_json(&token, "/api/videos/..%2Fetc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Upload a 10 MiB file, watch every checkpoint arrive, then fetch the
/// first KiB once the video is ready.
#[tokio::test]
async fn test_end_to_end_progress_then_partial_playback() {
    let app = TestApp::new(Some(&["Safe Scene"])).await;
    let token = app.token("alice", Role::Editor);

    let mut listener = app.state.broadcaster.register();
    assert!(app
        .state
        .broadcaster
        .join(listener.id, Channel::owner("alice")));

    let data = patterned(10_485_760);
    let (status, video) = app.upload(&token, "big.mp4", &data).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = video["id"].as_str().unwrap().to_string();

    let mut events: Vec<ProgressEvent> = Vec::new();
    let collect = async {
        while let Some(event) = listener.receiver.recv().await {
            let done = matches!(event.kind, EventKind::Completed { .. } | EventKind::Failed { .. });
            events.push(event);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("run did not finish");

    let percents: Vec<u8> = events.iter().filter_map(ProgressEvent::percent).collect();
    assert_eq!(percents, vec![0, 25, 50, 75, 100]);
    assert!(events.iter().all(|e| e.video_id.as_str() == id));
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(EventKind::Completed { advisory: false, .. })
    ));

    let settled = app.wait_settled(&token, &id).await;
    assert_eq!(settled["lifecycleState"], "ready");
    assert_eq!(settled["safetyVerdict"], "safe");

    let (status, headers, body) = app.stream(&token, &id, Some("bytes=0-1023")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-1023/10485760");
    assert_eq!(headers[header::CONTENT_LENGTH], "1024");
    assert_eq!(body, &data[..1024]);
}
