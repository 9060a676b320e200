//! HTTP API for a course session.
//!
//! Every route runs against one shared [`Session`]. After each mutation the
//! session's queued events are published on the [`EventBroadcaster`], so
//! WebSocket clients on `/ws` see changes made through any route.
//!
//! # Endpoints
//!
//! - `GET /api/status` - Session snapshot
//! - `GET /api/demos` - Catalog summary
//! - `POST /api/demos/:demo_type/load` - Load a demo
//! - `POST /api/demo/next`, `/api/demo/previous`, `/api/demo/step` - Navigate
//! - `POST /api/demo/complete` - Complete the current demo
//! - `POST /api/run` - Run code in the simulator
//! - `POST /api/validate` - Syntax-check code without running it
//! - `GET /api/templates/:language` - Starter program for a language
//! - `POST /api/exercise`, `/api/hint` - Record learner activity
//! - `GET /api/achievements`, `POST /api/achievements/:id/award` - Achievements
//! - `GET /api/progress/stats`, `/api/progress/analytics`, `/api/progress/export`
//! - `POST /api/progress/import`, `/api/progress/reset`
//! - `GET /ws` - Event stream
//!
//! # Example
//!
//! ```no_run
//! use coursekit_core::{create_router, AppState, Config, Session};
//!
//! # async fn example() {
//! let session = Session::from_config(Config::default()).unwrap();
//! let router = create_router(AppState::new(session));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::error::CourseError;
use crate::lesson::{DemoSummary, DemoView, Transition};
use crate::progress::{LearningAnalytics, ProgressExport, ProgressState, ProgressStats};
use crate::session::{AchievementListing, Session, SessionSnapshot};
use crate::simulator::{Execution, Language};
use crate::websocket::{ws_handler, EventBroadcaster};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/demo/step`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StepRequest {
    /// Target step index; out-of-range values are ignored.
    pub index: i64,
}

/// Response body for the navigation endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationResponse {
    /// What the request did.
    pub transition: Transition,
    /// The demonstration after the request.
    pub demo: DemoView,
}

/// Response body for `POST /api/demo/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    /// The completed demo type.
    pub demo_type: String,
    /// Whether this was the first completion.
    pub first_completion: bool,
}

/// Request body for `POST /api/run`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// Source to simulate.
    pub code: String,
    /// Language tag; the configured default when absent.
    #[serde(default)]
    pub language: Option<String>,
}

/// Response body for `POST /api/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// The language the code was checked as.
    pub language: Language,
    /// Whether the code passed the syntax check.
    pub valid: bool,
    /// The first problem found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for `GET /api/templates/:language`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateResponse {
    /// The requested language.
    pub language: Language,
    /// Starter source for the editor.
    pub template: String,
}

/// Request body for `POST /api/exercise`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRequest {
    /// Whether the learner made mistakes along the way.
    #[serde(default)]
    pub had_errors: bool,
}

/// Response body for `POST /api/achievements/:id/award`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardResponse {
    /// The achievement id.
    pub id: String,
    /// Whether it was newly unlocked.
    pub awarded: bool,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The learner's session.
    pub session: Arc<Mutex<Session>>,
    /// Publishes session events to WebSocket clients.
    pub broadcaster: EventBroadcaster,
}

impl AppState {
    /// Wraps `session` with a default broadcaster.
    ///
    /// Events queued while the session opened are dropped; nobody can be
    /// subscribed yet.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self::with_broadcaster(session, EventBroadcaster::default())
    }

    /// Wraps `session` with an existing broadcaster.
    #[must_use]
    pub fn with_broadcaster(mut session: Session, broadcaster: EventBroadcaster) -> Self {
        let dropped = session.drain_events().len();
        debug!(dropped, "Discarded events queued before serving");
        Self {
            session: Arc::new(Mutex::new(session)),
            broadcaster,
        }
    }

    fn publish(&self, session: &mut Session) {
        self.broadcaster.send_all(session.drain_events());
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The named demo, achievement or demonstration does not exist.
    NotFound(String),
    /// The request can never succeed as sent.
    BadRequest(String),
    /// Anything else.
    Internal(String),
}

impl From<CourseError> for ApiError {
    fn from(e: CourseError) -> Self {
        match e {
            CourseError::UnknownDemo { .. } | CourseError::UnknownAchievement { .. } => {
                Self::NotFound(e.to_string())
            }
            CourseError::ImportVersionMismatch { .. } | CourseError::UnsupportedLanguage { .. } => {
                Self::BadRequest(e.to_string())
            }
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router.
///
/// The router has:
/// - all API routes under `/api`
/// - the event stream on `/ws`
/// - CORS middleware for development
/// - tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handle_status))
        .route("/demos", get(handle_demos))
        .route("/demos/:demo_type/load", post(handle_load_demo))
        .route("/demo/next", post(handle_next_step))
        .route("/demo/previous", post(handle_previous_step))
        .route("/demo/step", post(handle_go_to_step))
        .route("/demo/complete", post(handle_complete_demo))
        .route("/run", post(handle_run))
        .route("/validate", post(handle_validate))
        .route("/templates/:language", get(handle_template))
        .route("/exercise", post(handle_exercise))
        .route("/hint", post(handle_hint))
        .route("/achievements", get(handle_achievements))
        .route("/achievements/:id/award", post(handle_award))
        .route("/progress/stats", get(handle_stats))
        .route("/progress/analytics", get(handle_analytics))
        .route("/progress/export", get(handle_export))
        .route("/progress/import", post(handle_import))
        .route("/progress/reset", post(handle_reset));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/status`.
async fn handle_status(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.lock().await.snapshot())
}

/// Handler for `GET /api/demos`.
async fn handle_demos(State(state): State<Arc<AppState>>) -> Json<Vec<DemoSummary>> {
    Json(state.session.lock().await.catalog().summaries())
}

/// Handler for `POST /api/demos/:demo_type/load`.
async fn handle_load_demo(
    State(state): State<Arc<AppState>>,
    Path(demo_type): Path<String>,
) -> Result<Json<DemoView>, ApiError> {
    info!(demo_type = %demo_type, "Load demo requested");
    let mut session = state.session.lock().await;
    let view = session.load_demo(&demo_type)?;
    state.publish(&mut session);
    Ok(Json(view))
}

/// Runs a navigation request against the loaded demo.
async fn navigate(
    state: &AppState,
    action: impl FnOnce(&mut Session) -> Transition,
) -> Result<Json<NavigationResponse>, ApiError> {
    let mut session = state.session.lock().await;
    if session.current_demo().is_none() {
        return Err(ApiError::NotFound("No demo is loaded".to_string()));
    }
    let transition = action(&mut *session);
    let demo = session
        .current_demo()
        .map(crate::lesson::Demonstration::view)
        .ok_or_else(|| ApiError::Internal("Demo disappeared during navigation".to_string()))?;
    state.publish(&mut session);
    Ok(Json(NavigationResponse { transition, demo }))
}

/// Handler for `POST /api/demo/next`.
async fn handle_next_step(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NavigationResponse>, ApiError> {
    navigate(&state, Session::next_step).await
}

/// Handler for `POST /api/demo/previous`.
async fn handle_previous_step(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NavigationResponse>, ApiError> {
    navigate(&state, Session::previous_step).await
}

/// Handler for `POST /api/demo/step`.
async fn handle_go_to_step(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StepRequest>,
) -> Result<Json<NavigationResponse>, ApiError> {
    navigate(&state, |session| session.go_to_step(request.index)).await
}

/// Handler for `POST /api/demo/complete`.
async fn handle_complete_demo(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let demo_type = session
        .current_demo()
        .map(|demo| demo.demo_type().to_string())
        .ok_or_else(|| ApiError::NotFound("No demo is loaded".to_string()))?;
    let first_completion = session.complete_demo(&demo_type)?;
    state.publish(&mut session);
    Ok(Json(CompleteResponse {
        demo_type,
        first_completion,
    }))
}

/// Handler for `POST /api/run`.
///
/// An unknown language tag is rejected with 400 before anything runs.
/// The interpreter and the store write run on the blocking pool.
async fn handle_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Execution>, ApiError> {
    if let Some(tag) = &request.language {
        tag.parse::<Language>()?;
    }
    let guard = Arc::clone(&state.session).lock_owned().await;
    let (mut session, execution) = tokio::task::spawn_blocking(move || {
        let mut session = guard;
        let execution = session.run_code(&request.code, request.language.as_deref());
        (session, execution)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Code run did not finish: {e}")))?;
    state.publish(&mut session);
    Ok(Json(execution))
}

/// Handler for `POST /api/validate`.
///
/// Never touches the execution counter.
async fn handle_validate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let session = state.session.lock().await;
    let language = match &request.language {
        Some(tag) => tag.parse::<Language>()?,
        None => session.simulator().default_language(),
    };
    let error = session.simulator().validate(&request.code, language).err();
    Ok(Json(ValidateResponse {
        language,
        valid: error.is_none(),
        error,
    }))
}

/// Handler for `GET /api/templates/:language`.
async fn handle_template(
    Path(tag): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let language = tag.parse::<Language>()?;
    Ok(Json(TemplateResponse {
        language,
        template: language.template().to_string(),
    }))
}

/// Handler for `POST /api/exercise`.
async fn handle_exercise(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExerciseRequest>,
) -> Json<ProgressState> {
    let mut session = state.session.lock().await;
    session.record_exercise_completion(request.had_errors);
    state.publish(&mut session);
    Json(session.state().clone())
}

/// Handler for `POST /api/hint`.
async fn handle_hint(State(state): State<Arc<AppState>>) -> Json<ProgressState> {
    let mut session = state.session.lock().await;
    session.record_hint_used();
    state.publish(&mut session);
    Json(session.state().clone())
}

/// Handler for `GET /api/achievements`.
async fn handle_achievements(State(state): State<Arc<AppState>>) -> Json<AchievementListing> {
    Json(state.session.lock().await.achievements())
}

/// Handler for `POST /api/achievements/:id/award`.
async fn handle_award(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AwardResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let awarded = session.award_achievement(&id)?;
    state.publish(&mut session);
    Ok(Json(AwardResponse { id, awarded }))
}

/// Handler for `GET /api/progress/stats`.
async fn handle_stats(State(state): State<Arc<AppState>>) -> Json<ProgressStats> {
    Json(state.session.lock().await.stats())
}

/// Handler for `GET /api/progress/analytics`.
async fn handle_analytics(State(state): State<Arc<AppState>>) -> Json<LearningAnalytics> {
    Json(state.session.lock().await.analytics())
}

/// Handler for `GET /api/progress/export`.
async fn handle_export(State(state): State<Arc<AppState>>) -> Json<ProgressExport> {
    Json(state.session.lock().await.export())
}

/// Handler for `POST /api/progress/import`.
async fn handle_import(
    State(state): State<Arc<AppState>>,
    Json(export): Json<ProgressExport>,
) -> Result<Json<ProgressState>, ApiError> {
    let mut session = state.session.lock().await;
    if let Err(e) = session.import(export) {
        warn!(error = %e, "Rejected progress import");
        return Err(e.into());
    }
    state.publish(&mut session);
    Ok(Json(session.state().clone()))
}

/// Handler for `POST /api/progress/reset`.
async fn handle_reset(State(state): State<Arc<AppState>>) -> Json<ProgressState> {
    info!("Progress reset requested");
    let mut session = state.session.lock().await;
    session.reset();
    state.publish(&mut session);
    Json(session.state().clone())
}

// ============================================================================
// Tests
// ============================================================================
