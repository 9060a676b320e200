//! coursekit core
//!
//! Lessons, learner progress, the code simulator, and the HTTP and
//! WebSocket surfaces that serve them.

pub mod api;
pub mod config;
pub mod error;
pub mod lesson;
pub mod progress;
pub mod session;
pub mod simulator;
pub mod storage;
pub mod websocket;

pub use api::{create_router, AppState, ErrorResponse};
pub use config::{AchievementConfig, Config, SimulatorConfig};
pub use error::{CourseError, Result};
pub use lesson::{Catalog, DemoSummary, DemoView, Demonstration, HookKind, StepHooks, Transition};
pub use progress::{
    AchievementDefinition, LearningAnalytics, ProgressExport, ProgressState, ProgressStats,
    ProgressTracker, SkillLevel, EXPORT_VERSION,
};
pub use session::{AchievementListing, Session, SessionSnapshot};
pub use simulator::{CodeSimulator, Execution, Language, OutputEvent, OutputKind};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use websocket::{CourseEvent, EventBroadcaster};
