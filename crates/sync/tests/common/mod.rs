//! Scripted scanner backend for integration tests.
//!
//! Serves the job-control HTTP surface from in-memory scripts: a list of
//! poll payloads served in order (the last repeats), a list of SSE events
//! with per-event delays, and failure switches. Runs on an ephemeral
//! port so tests exercise the real client stack end-to-end.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use piiwatch_core::snapshot::JobSnapshot;
use piiwatch_sync::config::SyncConfig;
use piiwatch_sync::events::SessionEvent;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// One scripted SSE event, emitted after `delay_ms`.
#[derive(Clone)]
pub struct ScriptedEvent {
    pub delay_ms: u64,
    pub name: String,
    pub data: String,
}

/// Shorthand constructor for scripted events.
pub fn sse(delay_ms: u64, name: &str, data: Value) -> ScriptedEvent {
    ScriptedEvent {
        delay_ms,
        name: name.to_string(),
        data: data.to_string(),
    }
}

/// Mutable script and hit counters shared with the test body.
#[derive(Default)]
pub struct StubState {
    /// Scan poll payloads served in order; the last one repeats.
    pub scan_polls: Mutex<Vec<Value>>,
    pub scan_poll_hits: AtomicUsize,
    /// Serve HTTP 500 from this scan-poll hit onward.
    pub scan_poll_fail_from: Mutex<Option<usize>>,
    /// SSE events served to each stream subscriber.
    pub stream_events: Mutex<Vec<ScriptedEvent>>,
    /// Monitor poll payloads served in order; the last one repeats.
    pub monitor_polls: Mutex<Vec<Value>>,
    pub monitor_poll_hits: AtomicUsize,
    /// Serve HTTP 500 from this monitor-poll hit onward.
    pub monitor_poll_fail_from: Mutex<Option<usize>>,
    pub scans_started: AtomicUsize,
    pub monitors_started: AtomicUsize,
    pub stops_requested: AtomicUsize,
}

pub struct StubServer {
    pub base_url: String,
    pub state: Arc<StubState>,
}

/// Bind the stub backend on an ephemeral port and serve it.
pub async fn start(state: Arc<StubState>) -> StubServer {
    let app = Router::new()
        .route("/api/scan", post(start_scan))
        .route("/api/scan/{id}", get(scan_status))
        .route("/api/scan/{id}/stream", get(scan_stream))
        .route("/api/monitor/start", post(start_monitor))
        .route("/api/monitor/{id}", get(monitor_status))
        .route("/api/monitor/{id}/stop", post(stop_monitor))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    StubServer {
        base_url: format!("http://{addr}"),
        state,
    }
}

/// Engine config pointed at the stub, with fast test intervals.
pub fn test_config(base_url: &str) -> SyncConfig {
    SyncConfig {
        base_url: base_url.to_string(),
        scan_poll_interval: Duration::from_millis(50),
        monitor_poll_interval: Duration::from_millis(50),
        dispose_timeout: Duration::from_secs(1),
    }
}

// ---- handlers ----

async fn start_scan(State(state): State<Arc<StubState>>) -> Json<Value> {
    let n = state.scans_started.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "scan_id": format!("scan-{n}"), "status": "started" }))
}

async fn scan_status(State(state): State<Arc<StubState>>) -> axum::response::Response {
    let hit = state.scan_poll_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(fail_from) = *state.scan_poll_fail_from.lock().unwrap() {
        if hit >= fail_from {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "backend exploded" })),
            )
                .into_response();
        }
    }
    Json(nth_payload(&state.scan_polls, hit)).into_response()
}

async fn scan_stream(
    State(state): State<Arc<StubState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.stream_events.lock().unwrap().clone();
    let stream = futures::stream::iter(events).then(|event| async move {
        if event.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(event.delay_ms)).await;
        }
        Ok::<Event, Infallible>(Event::default().event(event.name).data(event.data))
    });
    Sse::new(stream)
}

async fn start_monitor(State(state): State<Arc<StubState>>) -> Json<Value> {
    let n = state.monitors_started.fetch_add(1, Ordering::SeqCst) + 1;
    let started_at = chrono::Utc::now();
    let ends_at = started_at + chrono::Duration::hours(1);
    Json(json!({
        "monitor_id": format!("mon-{n}"),
        "status": "started",
        "started_at": started_at.to_rfc3339(),
        "ends_at": ends_at.to_rfc3339(),
    }))
}

async fn monitor_status(State(state): State<Arc<StubState>>) -> axum::response::Response {
    let hit = state.monitor_poll_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(fail_from) = *state.monitor_poll_fail_from.lock().unwrap() {
        if hit >= fail_from {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "monitor backend exploded" })),
            )
                .into_response();
        }
    }
    Json(nth_payload(&state.monitor_polls, hit)).into_response()
}

async fn stop_monitor(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.stops_requested.fetch_add(1, Ordering::SeqCst);
    Json(json!({}))
}

fn nth_payload(polls: &Mutex<Vec<Value>>, hit: usize) -> Value {
    let polls = polls.lock().unwrap();
    polls
        .get(hit.min(polls.len().saturating_sub(1)))
        .cloned()
        .unwrap_or_else(|| json!({ "status": "running", "progress": 0, "log": [] }))
}

// ---- event-collection helpers ----

/// Wait for the next `Finalized` event, asserting that progress never
/// decreases across the `Updated` events seen on the way.
pub async fn wait_finalized(rx: &mut broadcast::Receiver<SessionEvent>) -> JobSnapshot {
    let mut last_progress = 0.0;
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Updated { snapshot, .. }) => {
                    assert!(
                        snapshot.progress >= last_progress,
                        "progress regressed: {} -> {}",
                        last_progress,
                        snapshot.progress
                    );
                    last_progress = snapshot.progress;
                }
                Ok(SessionEvent::Finalized { snapshot, .. }) => return snapshot,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed early: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for finalization")
}

/// Collect every event published during `window`.
pub async fn collect_for(
    rx: &mut broadcast::Receiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let deadline = std::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return events;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => events.push(event),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(_)) | Err(_) => return events,
        }
    }
}
