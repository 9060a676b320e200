//! WebSocket event types and broadcasting for live course observation.
//!
//! Every session mutation that a dashboard might care about is published as
//! a [`CourseEvent`] and fanned out to all connected clients.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the session snapshot
//! - `step_changed` - A demo was loaded or its active step moved
//! - `demo_completed` - A demo was completed for the first time
//! - `achievement_unlocked` - An achievement was awarded
//! - `code_executed` - The simulator ran a submission
//! - `streak_updated` - The daily streak changed at session start
//! - `progress_reset` - All progress was cleared
//! - `error` - A non-fatal problem, such as unreadable stored progress
//!
//! # Example
//!
//! ```no_run
//! use coursekit_core::websocket::{CourseEvent, EventBroadcaster};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(CourseEvent::progress_reset());
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::lesson::DemoView;
use crate::progress::{AchievementDefinition, ProgressEvent};
use crate::session::SessionSnapshot;
use crate::simulator::Execution;

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as it stood when the client connected.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `demo_completed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoCompletedPayload {
    /// The completed demo type.
    pub demo_type: String,
}

/// Payload for the `streak_updated` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakUpdatedPayload {
    /// The new streak length in days.
    pub streak_days: u32,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published by a course session.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum CourseEvent {
    /// Sent when a client connects.
    Connected(Box<ConnectedPayload>),
    /// A demo was loaded or its active step moved.
    StepChanged(DemoView),
    /// A demo was completed for the first time.
    DemoCompleted(DemoCompletedPayload),
    /// An achievement was awarded.
    AchievementUnlocked(AchievementDefinition),
    /// The simulator ran a submission.
    CodeExecuted(Execution),
    /// The streak changed at session start.
    StreakUpdated(StreakUpdatedPayload),
    /// All progress was cleared.
    ProgressReset,
    /// A non-fatal problem occurred.
    Error(ErrorPayload),
}

impl CourseEvent {
    /// Creates a `Connected` event with the current snapshot.
    #[must_use]
    pub fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(Box::new(ConnectedPayload { snapshot }))
    }

    /// Creates a `StepChanged` event.
    #[must_use]
    pub const fn step_changed(view: DemoView) -> Self {
        Self::StepChanged(view)
    }

    /// Creates a `DemoCompleted` event.
    #[must_use]
    pub fn demo_completed(demo_type: impl Into<String>) -> Self {
        Self::DemoCompleted(DemoCompletedPayload {
            demo_type: demo_type.into(),
        })
    }

    /// Creates an `AchievementUnlocked` event.
    #[must_use]
    pub const fn achievement_unlocked(definition: AchievementDefinition) -> Self {
        Self::AchievementUnlocked(definition)
    }

    /// Creates a `CodeExecuted` event.
    #[must_use]
    pub const fn code_executed(execution: Execution) -> Self {
        Self::CodeExecuted(execution)
    }

    /// Creates a `StreakUpdated` event.
    #[must_use]
    pub const fn streak_updated(streak_days: u32) -> Self {
        Self::StreakUpdated(StreakUpdatedPayload { streak_days })
    }

    /// Creates a `ProgressReset` event.
    #[must_use]
    pub const fn progress_reset() -> Self {
        Self::ProgressReset
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::StepChanged(_) => "step_changed",
            Self::DemoCompleted(_) => "demo_completed",
            Self::AchievementUnlocked(_) => "achievement_unlocked",
            Self::CodeExecuted(_) => "code_executed",
            Self::StreakUpdated(_) => "streak_updated",
            Self::ProgressReset => "progress_reset",
            Self::Error(_) => "error",
        }
    }
}

impl From<ProgressEvent> for CourseEvent {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::AchievementUnlocked(definition) => Self::achievement_unlocked(definition),
            ProgressEvent::DemoCompleted { demo_type } => Self::demo_completed(demo_type),
            ProgressEvent::StreakUpdated { streak_days } => Self::streak_updated(streak_days),
            ProgressEvent::ProgressReset => Self::progress_reset(),
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts course events to all connected WebSocket clients.
///
/// Uses a tokio broadcast channel for pub-sub event distribution.
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<CourseEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscribers each buffer `capacity` events.
    ///
    /// A subscriber that falls further behind drops the oldest events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CourseEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all connected subscribers.
    ///
    /// Returns the number of receivers that will see it; 0 means nobody is
    /// listening.
    pub fn send(&self, event: CourseEvent) -> usize {
        // send() only fails when there are no receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Broadcasts each event in order and returns how many were sent.
    pub fn send_all(&self, events: impl IntoIterator<Item = CourseEvent>) -> usize {
        events
            .into_iter()
            .map(|event| {
                debug!(event = event.event_name(), "Broadcasting event");
                self.send(event)
            })
            .count()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type ClientSink = SplitSink<WebSocket, Message>;

/// Serializes `event` and writes it to the client.
///
/// Returns `false` once the client is gone. An event that fails to
/// serialize is logged and skipped.
async fn deliver(sink: &mut ClientSink, event: &CourseEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(event = event.event_name(), error = %e, "Dropping unserializable event");
            return true;
        }
    };
    sink.send(Message::Text(json)).await.is_ok()
}

/// Serves one dashboard connection.
///
/// - Sends `connected` with the current snapshot immediately
/// - Forwards every broadcast event to the client
/// - Pings every 30 seconds and closes after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut incoming) = socket.split();

    // Subscribe before taking the snapshot so nothing published in between is lost
    let mut events = state.broadcaster.subscribe();
    let snapshot = state.session.lock().await.snapshot();
    let demo = snapshot.demo.as_ref().map(|d| d.demo_type.clone());

    if !deliver(&mut sink, &CourseEvent::connected(snapshot)).await {
        debug!("Dashboard left before the snapshot was sent");
        return;
    }
    info!(demo = ?demo, "Dashboard connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; skip it so the first ping waits a full interval
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;
    let mut forwarded = 0usize;

    loop {
        tokio::select! {
            frame = incoming.next() => match frame {
                Some(Ok(Message::Pong(_))) => missed_pongs = 0,
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    debug!("Dashboards are read-only; ignoring client frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read failed");
                    break;
                }
            },

            received = events.recv() => match received {
                Ok(event) => {
                    if !deliver(&mut sink, &event).await {
                        break;
                    }
                    forwarded += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dashboard fell behind; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = heartbeat.tick() => {
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!(missed_pongs, "Dashboard stopped answering pings");
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                missed_pongs += 1;
            }
        }
    }

    info!(forwarded, "Dashboard disconnected");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::progress::Condition;
    use crate::simulator::OutputEvent;

    fn view() -> DemoView {
        DemoView {
            demo_type: "variables".to_string(),
            title: "Variables & Data Types".to_string(),
            current_step: 1,
            total_steps: 6,
            step_id: "declaring".to_string(),
            step_title: "Declaring Variables".to_string(),
            progress: 33,
            completed: false,
        }
    }

    // ------------------------------------------------------------------------
    // Event Serialization Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_step_changed_event_serialization() {
        let json = serde_json::to_string(&CourseEvent::step_changed(view())).unwrap();
        assert!(json.contains(r#""event":"step_changed""#));
        assert!(json.contains(r#""demoType":"variables""#));
        assert!(json.contains(r#""currentStep":1"#));
        assert!(json.contains(r#""progress":33"#));
    }

    #[test]
    fn test_demo_completed_event_serialization() {
        let json = serde_json::to_string(&CourseEvent::demo_completed("git")).unwrap();
        assert_eq!(json, r#"{"event":"demo_completed","payload":{"demoType":"git"}}"#);
    }

    #[test]
    fn test_achievement_unlocked_event_serialization() {
        let definition = AchievementDefinition {
            id: "first-step".to_string(),
            title: "First Steps".to_string(),
            icon: "🎯".to_string(),
            points: 10,
            condition: Condition::CompletedDemos(1),
        };
        let json = serde_json::to_string(&CourseEvent::achievement_unlocked(definition)).unwrap();
        assert!(json.contains(r#""event":"achievement_unlocked""#));
        assert!(json.contains(r#""id":"first-step""#));
        assert!(json.contains(r#""points":10"#));
    }

    #[test]
    fn test_code_executed_event_serialization() {
        let execution = Execution {
            events: vec![OutputEvent::log("2")],
            counted: true,
            execution_number: 4,
            milestone_reached: false,
            language: None,
        };
        let json = serde_json::to_string(&CourseEvent::code_executed(execution)).unwrap();
        assert!(json.contains(r#""event":"code_executed""#));
        assert!(json.contains(r#""executionNumber":4"#));
        assert!(json.contains(r#""kind":"log""#));
    }

    #[test]
    fn test_progress_reset_event_has_no_payload() {
        let json = serde_json::to_string(&CourseEvent::progress_reset()).unwrap();
        assert_eq!(json, r#"{"event":"progress_reset"}"#);
    }

    #[test]
    fn test_error_event_serialization() {
        let json = serde_json::to_string(&CourseEvent::error("storage unavailable")).unwrap();
        assert!(json.contains(r#""event":"error""#));
        assert!(json.contains(r#""message":"storage unavailable""#));
    }

    // ------------------------------------------------------------------------
    // Event Deserialization Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_streak_updated_event_deserialization() {
        let json = r#"{"event":"streak_updated","payload":{"streakDays":4}}"#;
        let event: CourseEvent = serde_json::from_str(json).unwrap();
        let CourseEvent::StreakUpdated(payload) = event else {
            unreachable!("expected streak_updated");
        };
        assert_eq!(payload.streak_days, 4);
    }

    #[test]
    fn test_step_changed_event_deserialization() {
        let json = serde_json::to_string(&CourseEvent::step_changed(view())).unwrap();
        let event: CourseEvent = serde_json::from_str(&json).unwrap();
        let CourseEvent::StepChanged(payload) = event else {
            unreachable!("expected step_changed");
        };
        assert_eq!(payload, view());
    }

    // ------------------------------------------------------------------------
    // Conversion Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_progress_events_convert() {
        let event = CourseEvent::from(ProgressEvent::DemoCompleted {
            demo_type: "functions".to_string(),
        });
        assert_eq!(event.event_name(), "demo_completed");

        let event = CourseEvent::from(ProgressEvent::StreakUpdated { streak_days: 2 });
        assert_eq!(event.event_name(), "streak_updated");

        assert_eq!(CourseEvent::from(ProgressEvent::ProgressReset).event_name(), "progress_reset");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(CourseEvent::step_changed(view()).event_name(), "step_changed");
        assert_eq!(CourseEvent::streak_updated(1).event_name(), "streak_updated");
        assert_eq!(CourseEvent::error("").event_name(), "error");
    }

    // ------------------------------------------------------------------------
    // Broadcaster Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_broadcaster_send_receive() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        assert_eq!(broadcaster.send(CourseEvent::streak_updated(1)), 1);

        let received = receiver.recv().await.unwrap();
        assert!(matches!(received, CourseEvent::StreakUpdated(_)));
    }

    #[tokio::test]
    async fn test_broadcaster_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver1 = broadcaster.subscribe();
        let mut receiver2 = broadcaster.subscribe();

        assert_eq!(broadcaster.send(CourseEvent::error("test")), 2);

        assert!(matches!(receiver1.recv().await.unwrap(), CourseEvent::Error(_)));
        assert!(matches!(receiver2.recv().await.unwrap(), CourseEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_broadcaster_send_all_keeps_order() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        let sent = broadcaster.send_all(vec![
            CourseEvent::demo_completed("variables"),
            CourseEvent::progress_reset(),
        ]);
        assert_eq!(sent, 2);

        assert_eq!(receiver.recv().await.unwrap().event_name(), "demo_completed");
        assert_eq!(receiver.recv().await.unwrap().event_name(), "progress_reset");
    }

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = EventBroadcaster::new(10);
        assert_eq!(broadcaster.send(CourseEvent::progress_reset()), 0);
    }

    #[test]
    fn test_broadcaster_receiver_count() {
        let broadcaster = EventBroadcaster::default();
        assert_eq!(broadcaster.receiver_count(), 0);

        let _receiver1 = broadcaster.subscribe();
        assert_eq!(broadcaster.receiver_count(), 1);

        let _receiver2 = broadcaster.subscribe();
        assert_eq!(broadcaster.receiver_count(), 2);
    }
}
