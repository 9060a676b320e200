//! Integration tests for the live event stream.
//!
//! These tests serve the full router on a local port and check that
//! WebSocket clients see the session snapshot on connect and every event
//! the HTTP API produces afterwards.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use coursekit_core::progress::SystemClock;
use coursekit_core::{
    create_router, AppState, Catalog, Config, CourseEvent, MemoryStore, Session,
};
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A fresh in-memory session.
fn new_state() -> AppState {
    let session = Session::open(
        Config::default(),
        Catalog::builtin().expect("built-in catalog loads"),
        Box::new(MemoryStore::new()),
        Arc::new(SystemClock),
    );
    AppState::new(session)
}

/// Spawns the test server and returns its base address (`127.0.0.1:port`).
async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, handle)
}

/// Connects a WebSocket client to the server at `addr`.
async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message and parses it as a `CourseEvent`.
/// Automatically handles ping frames by responding with pong.
async fn receive_event(client: &mut WsClient) -> CourseEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

async fn post(addr: &str, path: &str, body: serde_json::Value) -> serde_json::Value {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api{path}"))
        .json(&body)
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert!(
        response.status().is_success(),
        "POST {path} failed: {}",
        response.status()
    );
    response.json().await.expect("JSON response")
}

// ============================================================================
// Connection Tests
// ============================================================================

/// A client receives the session snapshot first.
#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let (addr, _handle) = spawn_test_server(new_state()).await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    if let CourseEvent::Connected(payload) = event {
        assert!(payload.snapshot.demo.is_none());
        assert_eq!(payload.snapshot.stats.total_demos, 6);
        assert_eq!(payload.snapshot.progress.streak_days, 1);
    } else {
        panic!("Expected Connected event, got: {event:?}");
    }
}

/// The snapshot reflects state changed before the client connected.
#[tokio::test]
async fn test_connected_event_contains_current_demo() {
    let state = new_state();
    state
        .session
        .lock()
        .await
        .load_demo("git")
        .expect("demo exists");
    let (addr, _handle) = spawn_test_server(state).await;

    let mut client = connect_client(&addr).await;
    if let CourseEvent::Connected(payload) = receive_event(&mut client).await {
        let demo = payload.snapshot.demo.expect("demo loaded");
        assert_eq!(demo.demo_type, "git");
        assert_eq!(demo.current_step, 0);
    } else {
        panic!("Expected Connected event");
    }
}

/// Several clients can connect at once.
#[tokio::test]
async fn test_multiple_clients_can_connect() {
    let (addr, _handle) = spawn_test_server(new_state()).await;

    let mut client1 = connect_client(&addr).await;
    let mut client2 = connect_client(&addr).await;
    let mut client3 = connect_client(&addr).await;

    assert!(matches!(receive_event(&mut client1).await, CourseEvent::Connected(_)));
    assert!(matches!(receive_event(&mut client2).await, CourseEvent::Connected(_)));
    assert!(matches!(receive_event(&mut client3).await, CourseEvent::Connected(_)));
}

// ============================================================================
// Event Broadcast Tests
// ============================================================================

/// Broadcast events reach every client.
#[tokio::test]
async fn test_events_broadcast_to_all_clients() {
    let state = new_state();
    let broadcaster = state.broadcaster.clone();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut client1 = connect_client(&addr).await;
    let mut client2 = connect_client(&addr).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    broadcaster.send(CourseEvent::streak_updated(4));

    for client in [&mut client1, &mut client2] {
        match receive_event(client).await {
            CourseEvent::StreakUpdated(payload) => assert_eq!(payload.streak_days, 4),
            other => panic!("Expected StreakUpdated event, got: {other:?}"),
        }
    }
}

// ============================================================================
// API Integration Tests
// ============================================================================

/// Loading and navigating a demo over HTTP publishes step changes.
#[tokio::test]
async fn test_navigation_publishes_step_changed() {
    let (addr, _handle) = spawn_test_server(new_state()).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    post(&addr, "/demos/variables/load", serde_json::json!({})).await;
    match receive_event(&mut client).await {
        CourseEvent::StepChanged(view) => {
            assert_eq!(view.demo_type, "variables");
            assert_eq!(view.current_step, 0);
        }
        other => panic!("Expected StepChanged event, got: {other:?}"),
    }

    post(&addr, "/demo/next", serde_json::json!({})).await;
    match receive_event(&mut client).await {
        CourseEvent::StepChanged(view) => assert_eq!(view.current_step, 1),
        other => panic!("Expected StepChanged event, got: {other:?}"),
    }
}

/// Completing a demo publishes the completion and its achievements.
#[tokio::test]
async fn test_completion_publishes_achievements() {
    let (addr, _handle) = spawn_test_server(new_state()).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    post(&addr, "/demos/functions/load", serde_json::json!({})).await;
    receive_event(&mut client).await;

    let body = post(&addr, "/demo/complete", serde_json::json!({})).await;
    assert_eq!(body["firstCompletion"], true);

    match receive_event(&mut client).await {
        CourseEvent::DemoCompleted(payload) => assert_eq!(payload.demo_type, "functions"),
        other => panic!("Expected DemoCompleted event, got: {other:?}"),
    }

    // Speed-learner and first-step both unlock on a quick first completion
    let mut unlocked = Vec::new();
    for _ in 0..2 {
        match receive_event(&mut client).await {
            CourseEvent::AchievementUnlocked(definition) => unlocked.push(definition.id),
            other => panic!("Expected AchievementUnlocked event, got: {other:?}"),
        }
    }
    assert!(unlocked.contains(&"first-step".to_string()));
    assert!(unlocked.contains(&"speed-learner".to_string()));
}

/// Running code publishes the execution.
#[tokio::test]
async fn test_run_publishes_code_executed() {
    let (addr, _handle) = spawn_test_server(new_state()).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    let body = post(
        &addr,
        "/run",
        serde_json::json!({ "code": "console.log('hi')", "language": "javascript" }),
    )
    .await;
    assert_eq!(body["executionNumber"], 1);

    match receive_event(&mut client).await {
        CourseEvent::CodeExecuted(execution) => {
            assert!(execution.counted);
            assert_eq!(execution.events[0].content, "hi");
        }
        other => panic!("Expected CodeExecuted event, got: {other:?}"),
    }
}

/// Resetting progress publishes a reset event.
#[tokio::test]
async fn test_reset_publishes_progress_reset() {
    let (addr, _handle) = spawn_test_server(new_state()).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    post(&addr, "/progress/reset", serde_json::json!({})).await;
    assert!(matches!(
        receive_event(&mut client).await,
        CourseEvent::ProgressReset
    ));
}

// ============================================================================
// Disconnection Tests
// ============================================================================

/// The server keeps serving after a client disconnects.
#[tokio::test]
async fn test_server_continues_after_client_disconnect() {
    let state = new_state();
    let broadcaster = state.broadcaster.clone();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut client1 = connect_client(&addr).await;
    receive_event(&mut client1).await;
    client1.close(None).await.ok();
    drop(client1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client2 = connect_client(&addr).await;
    assert!(matches!(receive_event(&mut client2).await, CourseEvent::Connected(_)));

    broadcaster.send(CourseEvent::error("storage unavailable"));
    match receive_event(&mut client2).await {
        CourseEvent::Error(payload) => assert_eq!(payload.message, "storage unavailable"),
        other => panic!("Expected Error event, got: {other:?}"),
    }
}
