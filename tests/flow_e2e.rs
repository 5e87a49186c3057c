//! End-to-end recording flow scenarios against a local mock backend.
//!
//! The backend serves the public collection endpoint, issues upload
//! tickets, accepts the clip PUT (optionally failing it), and stores the
//! registration payload for assertions.

use axum::body::Bytes as BodyBytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use vouchbooth::capture::{ClipFormat, MediaDevices};
use vouchbooth::recorder::FinishedClip;
use vouchbooth::submit::ApiError;
use vouchbooth::utils::ManualClock;
use vouchbooth::{ApiClient, ClientIdentity, FlowState, RecordingFlow, SyntheticDevices};

struct BackendState {
    addr: SocketAddr,
    fail_upload: AtomicBool,
    received_bytes: AtomicUsize,
    registered: Mutex<Option<Value>>,
}

struct TestBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
}

async fn spawn_backend() -> TestBackend {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(BackendState {
        addr,
        fail_upload: AtomicBool::new(false),
        received_bytes: AtomicUsize::new(0),
        registered: Mutex::new(None),
    });

    let router = Router::new()
        .route("/api/collections/public/:slug", get(get_collection))
        .route("/api/upload", post(create_upload))
        .route("/ingest/:id", put(ingest))
        .route("/api/videos", post(register))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestBackend { addr, state }
}

impl TestBackend {
    fn api(&self) -> ApiClient {
        ApiClient::new(format!("http://{}", self.addr)).unwrap()
    }
}

async fn get_collection(
    Path(slug): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match slug.as_str() {
        "acme-stories" => Ok(Json(collection_json(true))),
        "retired" => Ok(Json(collection_json(false))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

fn collection_json(active: bool) -> Value {
    json!({
        "id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
        "name": "Acme Stories",
        "slug": if active { "acme-stories" } else { "retired" },
        "welcomeMessage": "Tell us your story!",
        "promptQuestions": ["What problem did we solve?"],
        "logoUrl": null,
        "brandColor": "#6d28d9",
        "maxDuration": 30,
        "isActive": active,
    })
}

async fn create_upload(State(state): State<Arc<BackendState>>) -> Json<Value> {
    Json(json!({
        "uploadUrl": format!("http://{}/ingest/up_123", state.addr),
        "uploadId": "up_123",
    }))
}

async fn ingest(
    State(state): State<Arc<BackendState>>,
    Path(_id): Path<String>,
    body: BodyBytes,
) -> (StatusCode, &'static str) {
    if state.fail_upload.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "ingest failed");
    }
    state.received_bytes.store(body.len(), Ordering::SeqCst);
    (StatusCode::OK, "ok")
}

async fn register(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let record = json!({
        "id": Uuid::new_v4(),
        "collectionId": body["collectionId"],
        "clientName": body["clientName"],
        "clientEmail": body["clientEmail"],
        "clientCompany": body["clientCompany"],
        "uploadId": body["uploadId"],
        "status": "UPLOADING",
        "playbackId": null,
        "duration": null,
        "thumbnailUrl": null,
        "createdAt": "2026-08-07T12:00:00Z",
    });
    *state.registered.lock().unwrap() = Some(body);
    (StatusCode::CREATED, Json(record))
}

async fn wait_for_state(flow: &RecordingFlow, want: FlowState) {
    for _ in 0..2000 {
        if flow.state() == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("flow never reached {:?}, still {:?}", want, flow.state());
}

#[tokio::test]
async fn test_collection_lookup_treats_missing_and_inactive_alike() {
    let backend = spawn_backend().await;
    let api = backend.api();

    assert!(matches!(
        api.fetch_collection("no-such-collection").await,
        Err(ApiError::CollectionUnavailable)
    ));
    assert!(matches!(
        api.fetch_collection("retired").await,
        Err(ApiError::CollectionUnavailable)
    ));

    let collection = api.fetch_collection("acme-stories").await.unwrap();
    assert_eq!(collection.max_duration, 30);
}

#[tokio::test]
async fn test_upload_progress_is_monotonic_and_ends_at_100() {
    let backend = spawn_backend().await;
    let api = backend.api();

    let ticket = api.create_upload(Uuid::new_v4()).await.unwrap();
    let clip = FinishedClip {
        data: Bytes::from(vec![7u8; 300 * 1024]),
        format: ClipFormat::Mp4,
    };

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    api.upload_clip(&ticket.upload_url, &clip, move |pct| {
        sink.lock().unwrap().push(pct);
    })
    .await
    .unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 100);
    assert_eq!(
        backend.state.received_bytes.load(Ordering::SeqCst),
        clip.len()
    );
}

#[tokio::test]
async fn test_full_flow_records_thirty_seconds_and_submits() {
    let backend = spawn_backend().await;
    let api = backend.api();
    let collection = api.fetch_collection("acme-stories").await.unwrap();

    let devices = Arc::new(SyntheticDevices::new());
    let clock = Arc::new(ManualClock::new());
    let mut flow = RecordingFlow::new(
        collection,
        devices.clone() as Arc<dyn MediaDevices>,
        clock.clone(),
        api,
    )
    .unwrap();

    flow.submit_details(ClientIdentity::new("Jane", None, None))
        .unwrap();
    flow.request_access().await.unwrap();
    assert_eq!(flow.state(), FlowState::Ready);

    flow.start_recording().unwrap();
    assert_eq!(flow.state(), FlowState::Recording);

    // Never stopped manually; the duration cap forces review at 30s.
    clock.advance(30);
    wait_for_state(&flow, FlowState::Review).await;
    assert_eq!(flow.elapsed_secs(), 30);

    let clip_len = flow.finished_clip().unwrap().len();

    flow.submit().await.unwrap();
    assert_eq!(flow.state(), FlowState::Done);

    // The device session is released once the submission lands.
    assert_eq!(devices.close_count(), 1);
    assert_eq!(
        backend.state.received_bytes.load(Ordering::SeqCst),
        clip_len
    );

    let registered = backend.state.registered.lock().unwrap().clone().unwrap();
    assert_eq!(registered["clientName"], "Jane");
    assert_eq!(registered["uploadId"], "up_123");
    assert_eq!(
        registered["collectionId"],
        "6f9619ff-8b86-d011-b42d-00cf4fc964ff"
    );
}

#[tokio::test]
async fn test_failed_transfer_lands_in_error_and_retries_without_reacquiring() {
    let backend = spawn_backend().await;
    backend.state.fail_upload.store(true, Ordering::SeqCst);

    let api = backend.api();
    let collection = api.fetch_collection("acme-stories").await.unwrap();

    let devices = Arc::new(SyntheticDevices::new());
    let clock = Arc::new(ManualClock::new());
    let mut flow = RecordingFlow::new(
        collection,
        devices.clone() as Arc<dyn MediaDevices>,
        clock.clone(),
        api,
    )
    .unwrap();

    flow.submit_details(ClientIdentity::new("Jane", None, None))
        .unwrap();
    flow.request_access().await.unwrap();
    flow.start_recording().unwrap();

    clock.advance(30);
    wait_for_state(&flow, FlowState::Review).await;

    flow.submit().await.unwrap();
    assert!(matches!(flow.state(), FlowState::Error { .. }));

    // The device session is still held; retrying goes straight back to
    // ready with no second permission round-trip.
    assert_eq!(devices.acquire_count(), 1);
    flow.retake().unwrap();
    assert_eq!(flow.state(), FlowState::Ready);
    assert_eq!(devices.acquire_count(), 1);
    assert_eq!(flow.elapsed_secs(), 0);

    // A fresh attempt succeeds once the backend recovers.
    backend.state.fail_upload.store(false, Ordering::SeqCst);
    flow.start_recording().unwrap();
    clock.advance(30);
    wait_for_state(&flow, FlowState::Review).await;
    flow.submit().await.unwrap();
    assert_eq!(flow.state(), FlowState::Done);
}
