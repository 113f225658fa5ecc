//! Integration tests against an in-process fake analysis backend.
//!
//! The fake serves the same routes as the real backend: CSV upload, WebRTC offer,
//! report request and the two event streams.

use analyst_client::{
    AnalystConfig, Backend, ClientError, ClientResult, ConnectionStatus, IceGatheringState,
    PeerConnection, PeerConnectionState, ProgressSession, ReportClient, SdpKind,
    SessionDescription, SessionState, SignalingClient, TranscriptSession, UploadClient,
};
use analyst_core::{RenderUnit, Role};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

type Offers = Arc<Mutex<Vec<Value>>>;

const TRANSCRIPT: &[&str] = &[
    "user:How many rows ",
    "user:are there?",
    "garbage",
    "assistant:Let me check.\ncode:len(df)",
    "data:120",
    "image:QUJD",
    "assistant:Done.",
];

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn upload_handler(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let session_id = query.get("session_id").cloned().unwrap_or_default();
    if session_id == "reject-me" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Invalid CSV header" })),
        )
            .into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let text = String::from_utf8_lossy(&body).to_ascii_lowercase();
    if !content_type.starts_with("multipart/form-data")
        || !text.contains("name=\"file\"")
        || !text.contains("content-type: text/csv")
    {
        return (StatusCode::UNPROCESSABLE_ENTITY, "expected a csv file part").into_response();
    }
    let file_name = if text.contains("filename=\"sales.csv\"") {
        "sales.csv"
    } else {
        "unknown.csv"
    };

    Json(json!({
        "message": "File uploaded successfully",
        "sessionId": session_id,
        "fileName": file_name,
        "size": body.len(),
    }))
    .into_response()
}

async fn offer_handler(State(offers): State<Offers>, Json(body): Json<Value>) -> Json<Value> {
    offers.lock().unwrap().push(body);
    Json(json!({ "sdp": "v=0 answer", "type": "answer", "pc_id": "pc-42" }))
}

async fn report_handler(Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    if email == "bounce@example.com" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Mailer unavailable" })),
        )
            .into_response();
    }
    let session_id = body["session_id"].as_str().unwrap_or_default();
    Json(json!({
        "message": format!("Report for {} queued", email),
        "url": format!("https://reports.example/{}", session_id),
    }))
    .into_response()
}

fn event_stream(messages: &[&str]) -> Response {
    let events: Vec<Result<Event, Infallible>> = messages
        .iter()
        .map(|m| Ok(Event::default().data(*m)))
        .collect();
    Sse::new(stream::iter(events)).into_response()
}

async fn transcript_handler(Query(query): Query<HashMap<String, String>>) -> Response {
    if query.get("session_id").map(String::as_str) == Some("missing") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "unknown session" })),
        )
            .into_response();
    }
    if query.get("session_id").map(String::as_str) == Some("slow") {
        return slow_code_stream();
    }
    event_stream(TRANSCRIPT)
}

/// Fifty `code:` lines, 20 ms apart.
fn slow_code_stream() -> Response {
    let events = stream::iter(0..50).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, Infallible>(Event::default().data(format!("code:{}", i)))
    });
    Sse::new(events).into_response()
}

async fn progress_handler() -> Response {
    event_stream(&[
        "Enriched row 1/3",
        "keepalive",
        "Enriched row 3/3. View: https://sheets.example/abc",
    ])
}

async fn spawn_backend() -> (AnalystConfig, Offers) {
    let offers: Offers = Arc::default();
    let app = Router::new()
        .route("/api/upload-csv", post(upload_handler))
        .route("/api/offer", post(offer_handler))
        .route("/api/report", post(report_handler))
        .route("/api/transcript-events", get(transcript_handler))
        .route("/api/enrichment-events", get(progress_handler))
        .with_state(Arc::clone(&offers));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = AnalystConfig {
        backend_url: format!("http://{}", addr),
        ..AnalystConfig::default()
    };
    (config, offers)
}

struct FakePeer {
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    closed: Mutex<bool>,
    connection: watch::Sender<PeerConnectionState>,
}

impl FakePeer {
    fn new() -> Self {
        Self {
            local: Mutex::default(),
            remote: Mutex::default(),
            closed: Mutex::default(),
            connection: watch::channel(PeerConnectionState::New).0,
        }
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> ClientResult<SessionDescription> {
        Ok(SessionDescription::offer("v=0 offer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> ClientResult<()> {
        *self.local.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        IceGatheringState::Complete
    }

    fn subscribe_ice_gathering(&self) -> watch::Receiver<IceGatheringState> {
        watch::channel(IceGatheringState::Complete).1
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.connection.borrow()
    }

    fn subscribe_connection_state(&self) -> watch::Receiver<PeerConnectionState> {
        self.connection.subscribe()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> ClientResult<()> {
        *self.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn close(&self) -> ClientResult<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

#[tokio::test]
async fn upload_sends_multipart_csv() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales.csv");
    std::fs::write(&path, "region,total\nnorth,12\n").unwrap();

    let client = UploadClient::new(Backend::new(config).unwrap());
    let receipt = client.upload_csv(&path, "session-1").await.unwrap();

    assert_eq!(receipt.message.as_deref(), Some("File uploaded successfully"));
    assert_eq!(receipt.session_id.as_deref(), Some("session-1"));
    assert_eq!(receipt.file_name.as_deref(), Some("sales.csv"));
    assert!(receipt.size.unwrap_or(0) > 0);
}

#[tokio::test]
async fn upload_rejection_carries_backend_detail() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let client = UploadClient::new(Backend::new(config).unwrap());

    let err = client
        .upload_bytes("sales.csv", b"a,b\n".to_vec(), "reject-me")
        .await
        .unwrap_err();
    match err {
        ClientError::Rejected { status, reason } => {
            assert_eq!(status, 400);
            assert_eq!(reason, "Invalid CSV header");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn renegotiation_reuses_pc_id() {
    init_tracing();
    let (config, offers) = spawn_backend().await;
    let mut signaling = SignalingClient::new(Backend::new(config).unwrap());
    let peer = FakePeer::new();

    let answer = signaling.negotiate(&peer, "session-1").await.unwrap();
    assert_eq!(answer.kind, SdpKind::Answer);
    assert_eq!(signaling.pc_id(), Some("pc-42"));
    assert_eq!(peer.remote.lock().unwrap().clone(), Some(answer));

    signaling.negotiate(&peer, "session-1").await.unwrap();

    {
        let offers = offers.lock().unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0]["type"], "offer");
        assert_eq!(offers[0]["sdp"], "v=0 offer");
        assert_eq!(offers[0]["session_id"], "session-1");
        assert!(offers[0].get("pc_id").is_none());
        assert_eq!(offers[1]["pc_id"], "pc-42");
    }

    signaling.disconnect(&peer).await.unwrap();
    assert!(*peer.closed.lock().unwrap());
    assert_eq!(signaling.pc_id(), None);
}

async fn wait_for_status(signaling: &SignalingClient, expected: ConnectionStatus) {
    let mut statuses = signaling.subscribe_status();
    timeout(Duration::from_secs(5), statuses.wait_for(|s| *s == expected))
        .await
        .expect("status did not change in time")
        .unwrap();
}

#[tokio::test]
async fn connection_status_follows_negotiation_and_peer() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let mut signaling = SignalingClient::new(Backend::new(config).unwrap());
    let peer = FakePeer::new();
    assert_eq!(signaling.status(), ConnectionStatus::Disconnected);

    signaling.negotiate(&peer, "session-1").await.unwrap();
    assert!(signaling.status().is_connected());

    peer.connection.send_replace(PeerConnectionState::Disconnected);
    wait_for_status(&signaling, ConnectionStatus::Disconnected).await;

    peer.connection.send_replace(PeerConnectionState::Connected);
    wait_for_status(&signaling, ConnectionStatus::Connected).await;

    signaling.disconnect(&peer).await.unwrap();
    assert_eq!(signaling.status(), ConnectionStatus::Disconnected);

    // After disconnect the peer's state no longer drives the status.
    peer.connection.send_replace(PeerConnectionState::Connected);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(signaling.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn failed_negotiation_reports_failure() {
    init_tracing();
    let config = AnalystConfig {
        backend_url: "http://127.0.0.1:9".to_string(),
        ..AnalystConfig::default()
    };
    let mut signaling = SignalingClient::new(Backend::new(config).unwrap());
    let peer = FakePeer::new();

    assert!(signaling.negotiate(&peer, "session-1").await.is_err());
    assert!(matches!(signaling.status(), ConnectionStatus::Failed(_)));
    assert_eq!(signaling.status().to_string(), "Connection failed");
}

#[tokio::test]
async fn report_request_round_trip() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let reports = ReportClient::new(Backend::new(config).unwrap());

    let ack = reports
        .request_report("session-1", " ana@example.com ")
        .await
        .unwrap();
    assert_eq!(ack.message.as_deref(), Some("Report for ana@example.com queued"));
    assert_eq!(ack.report_url.as_deref(), Some("https://reports.example/session-1"));

    let err = reports
        .request_report("session-1", "bounce@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 500, ref reason } if reason == "Mailer unavailable"));

    assert!(matches!(
        reports.request_report("session-1", "nobody").await,
        Err(ClientError::InvalidEmail(_))
    ));
}

#[tokio::test]
async fn transcript_session_follows_the_stream() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let mut session = TranscriptSession::open(config, "session-1").unwrap();

    let last = session.finished().await;
    assert_eq!(last.state, SessionState::Ended);
    assert_eq!(last.view.line_count, 8);

    let units = &last.view.units;
    assert_eq!(units.len(), 5);
    assert!(matches!(&units[0], RenderUnit::Bubble(b) if b.role == Role::User && b.text == "How many rows are there?"));
    assert!(matches!(&units[1], RenderUnit::Bubble(b) if b.role == Role::Assistant && b.text == "Let me check."));
    assert!(matches!(&units[2], RenderUnit::CodeResult(c) if c.code == "len(df)" && c.result == "120"));
    assert!(matches!(&units[3], RenderUnit::Image(i) if i.payload == "QUJD"));
    assert!(matches!(&units[4], RenderUnit::Bubble(b) if b.text == "Done."));

    // A restart replays into a fresh interpreter rather than appending.
    session.restart();
    let again = session.finished().await;
    assert_eq!(again.state, SessionState::Ended);
    assert_eq!(again.view.line_count, 8);
    assert_eq!(again.view.units, last.view.units);
}

#[tokio::test]
async fn transcript_session_reports_refused_stream() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let session = TranscriptSession::open(config, "missing").unwrap();

    match session.finished().await.state {
        SessionState::Failed(reason) => assert!(reason.contains("unknown session"), "{reason}"),
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn progress_session_tracks_enrichment() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let session = ProgressSession::open(config, "session-1").unwrap();

    let last = session.finished().await;
    assert_eq!(last.state, SessionState::Ended);
    assert_eq!(last.view.current, 3);
    assert_eq!(last.view.total, 3);
    assert!(last.view.is_complete());
    assert_eq!(last.view.sheet_url.as_deref(), Some("https://sheets.example/abc"));
}

async fn wait_for_lines(session: &TranscriptSession, at_least: usize) -> usize {
    let mut updates = session.subscribe();
    let snapshot = timeout(
        Duration::from_secs(5),
        updates.wait_for(|s| s.view.line_count >= at_least),
    )
    .await
    .expect("stream did not advance in time")
    .unwrap()
    .clone();
    snapshot.view.line_count
}

#[tokio::test]
async fn restart_mid_stream_starts_from_a_fresh_interpreter() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let mut session = TranscriptSession::open(config, "slow").unwrap();

    let before = wait_for_lines(&session, 10).await;
    session.restart();
    let reset = session.snapshot();
    assert_eq!(reset.state, SessionState::Connecting);
    assert_eq!(reset.view.line_count, 0);

    let after_restart = wait_for_lines(&session, 1).await;
    assert!(
        after_restart < before,
        "old stream leaked into the new one: before={} after={}",
        before,
        after_restart
    );
    session.close();
}

#[tokio::test]
async fn close_mid_stream_stops_delivery() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let mut session = TranscriptSession::open(config, "slow").unwrap();
    wait_for_lines(&session, 3).await;

    let mut updates = session.subscribe();
    session.close();
    let closed = updates.borrow_and_update().clone();
    assert_eq!(closed.state, SessionState::Ended);
    assert!(!session.is_active());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!updates.has_changed().unwrap());
    let later = session.snapshot();
    assert_eq!(later.state, SessionState::Ended);
    assert_eq!(later.view.line_count, closed.view.line_count);
}

#[tokio::test]
async fn dropped_session_publishes_nothing_more() {
    init_tracing();
    let (config, _) = spawn_backend().await;
    let session = TranscriptSession::open(config, "slow").unwrap();
    wait_for_lines(&session, 3).await;

    let mut updates = session.subscribe();
    let at_drop = updates.borrow_and_update().view.line_count;
    drop(session);

    // The channel closes once the aborted pump is gone; nothing arrives before that.
    let changed = timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("pump was not torn down");
    assert!(changed.is_err());
    assert_eq!(updates.borrow().view.line_count, at_drop);
}
