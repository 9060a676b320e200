//! The course session: one learner, one catalog, one store.
//!
//! A [`Session`] is the context object every host (the HTTP server, the
//! CLI, tests) drives. It owns the tracker, the simulator and the current
//! demonstration, writes progress back to its store after every mutation,
//! and queues [`CourseEvent`]s for the host to publish.
//!
//! Storage failures never interrupt a session. Unreadable progress falls
//! back to a fresh record and failed writes are logged and dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use coursekit_core::lesson::Catalog;
//! use coursekit_core::progress::SystemClock;
//! use coursekit_core::session::Session;
//! use coursekit_core::storage::MemoryStore;
//! use coursekit_core::Config;
//!
//! let catalog = Catalog::builtin().unwrap();
//! let mut session = Session::open(
//!     Config::default(),
//!     catalog,
//!     Box::new(MemoryStore::new()),
//!     Arc::new(SystemClock),
//! );
//!
//! session.load_demo("variables").unwrap();
//! let execution = session.run_code("print('hi')", Some("python"));
//! assert_eq!(execution.events[0].content, "hi");
//! assert_eq!(session.state().code_executions, 1);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CourseError, Result};
use crate::lesson::{Catalog, DemoView, Demonstration, HookKind, StepHook, StepHooks, Transition};
use crate::progress::achievements::CODE_RUNNER;
use crate::progress::{
    AchievementBook, AchievementDefinition, Clock, LearningAnalytics, ProgressExport,
    ProgressState, ProgressStats, ProgressTracker, ScoringRules, SystemClock,
};
use crate::simulator::{CodeSimulator, Execution, Language};
use crate::storage::{JsonFileStore, KeyValueStore};
use crate::websocket::CourseEvent;

// ============================================================================
// Views
// ============================================================================

/// Everything a dashboard needs to draw the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// The running demonstration, if any.
    pub demo: Option<DemoView>,
    /// The persisted progress record.
    pub progress: ProgressState,
    /// Statistics including the running session.
    pub stats: ProgressStats,
    /// Executions counted by this session's simulator.
    pub session_executions: u32,
    /// Language used for untagged submissions.
    pub default_language: Language,
    /// Why stored progress was discarded at open, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_warning: Option<String>,
}

/// Earned and outstanding achievements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementListing {
    /// Unlocked achievements in unlock order.
    pub earned: Vec<AchievementDefinition>,
    /// Achievements still to earn, in book order.
    pub available: Vec<AchievementDefinition>,
}

// ============================================================================
// Session
// ============================================================================

/// A learner's course session.
pub struct Session {
    config: Config,
    catalog: Catalog,
    tracker: ProgressTracker,
    simulator: CodeSimulator,
    store: Box<dyn KeyValueStore>,
    hooks: StepHooks,
    current: Option<Demonstration>,
    load_warning: Option<String>,
    events: Vec<CourseEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("storage_key", &self.config.storage_key)
            .field("demos", &self.catalog.total_demos())
            .field("current", &self.current.as_ref().map(Demonstration::demo_type))
            .field("executions", &self.simulator.executions())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Opens a session over `store`.
    ///
    /// Stored progress is merged over defaults. If it cannot be read or
    /// parsed the session starts fresh and [`Session::load_warning`]
    /// explains why. The streak is updated and the result persisted.
    #[must_use]
    pub fn open(
        config: Config,
        catalog: Catalog,
        store: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, load_warning) = match load_state(store.as_ref(), &config.storage_key) {
            Ok(state) => (state, None),
            Err(e) => {
                warn!(error = %e, "Starting with fresh progress");
                (ProgressState::default(), Some(e.to_string()))
            }
        };

        let total_demos = catalog.total_demos();
        let book = AchievementBook::standard(total_demos, config.simulator.execution_milestone);
        let rules = ScoringRules {
            speed_learner_minutes: config.achievements.speed_learner_minutes,
            demo_completion_points: config.achievements.demo_completion_points,
        };
        let tracker = ProgressTracker::new(state, book, total_demos, rules, clock);
        let simulator = CodeSimulator::new(&config.simulator);

        let mut session = Self {
            config,
            catalog,
            tracker,
            simulator,
            store,
            hooks: StepHooks::new(),
            current: None,
            events: Vec::new(),
            load_warning,
        };

        if let Some(warning) = session.load_warning.clone() {
            session.events.push(CourseEvent::error(warning));
        }
        session.tracker.start_session();
        session.commit();

        info!(
            storage_key = %session.config.storage_key,
            completed = session.tracker.state().completed_demos.len(),
            streak_days = session.tracker.state().streak_days,
            "Session opened"
        );
        session
    }

    /// Opens a session as `config` describes it: its catalog (or the
    /// built-in one), a file store under `storageDir` and the system clock.
    ///
    /// # Errors
    ///
    /// Returns a catalog error if the configured catalog cannot be loaded.
    pub fn from_config(config: Config) -> Result<Self> {
        let catalog = match &config.catalog {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin()?,
        };
        let store = JsonFileStore::new(config.storage_path());
        Ok(Self::open(config, catalog, Box::new(store), Arc::new(SystemClock)))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The session configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The lesson catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The progress tracker.
    #[must_use]
    pub const fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// The current progress record.
    #[must_use]
    pub const fn state(&self) -> &ProgressState {
        self.tracker.state()
    }

    /// The code simulator.
    #[must_use]
    pub const fn simulator(&self) -> &CodeSimulator {
        &self.simulator
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// The running demonstration, if any.
    #[must_use]
    pub const fn current_demo(&self) -> Option<&Demonstration> {
        self.current.as_ref()
    }

    /// Why stored progress was discarded at open, if it was.
    #[must_use]
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    /// Registers a step hook for demos loaded from now on.
    pub fn register_hook(
        &mut self,
        demo_type: impl Into<String>,
        step_id: impl Into<String>,
        kind: HookKind,
        hook: StepHook,
    ) {
        self.hooks.register(demo_type, step_id, kind, hook);
    }

    // ------------------------------------------------------------------------
    // Demos
    // ------------------------------------------------------------------------

    /// Makes `demo_type` the current demonstration at step 0.
    ///
    /// The previous demonstration's exit hook runs first.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::UnknownDemo` if the catalog has no such demo;
    /// the current demonstration is left running.
    pub fn load_demo(&mut self, demo_type: &str) -> Result<DemoView> {
        let definition = self.catalog.get(demo_type)?;
        let demo = Demonstration::new(definition, &self.hooks)?;

        if let Some(previous) = self.current.take() {
            debug!(demo_type = previous.demo_type(), "Tearing down demo");
            previous.teardown();
        }
        demo.enter();
        self.tracker.start_demo(demo_type);

        let view = demo.view();
        info!(demo_type, steps = demo.len(), "Demo loaded");
        self.events.push(CourseEvent::step_changed(view.clone()));
        self.current = Some(demo);
        Ok(view)
    }

    /// Moves the current demonstration to `index`.
    ///
    /// Out-of-range indices and a missing demonstration are ignored.
    pub fn go_to_step(&mut self, index: i64) -> Transition {
        let Some(demo) = self.current.as_mut() else {
            debug!(index, "No demo loaded; ignoring step change");
            return Transition::Ignored;
        };
        let transition = demo.go_to_step(index);
        if transition.is_moved() {
            self.events.push(CourseEvent::step_changed(demo.view()));
        }
        transition
    }

    /// Advances one step, completing the demo when already at the last one.
    pub fn next_step(&mut self) -> Transition {
        let Some(demo) = self.current.as_mut() else {
            debug!("No demo loaded; ignoring next step");
            return Transition::Ignored;
        };
        let transition = demo.next_step();
        match transition {
            Transition::Moved { .. } => self.events.push(CourseEvent::step_changed(demo.view())),
            Transition::Completed => {
                let demo_type = demo.demo_type().to_string();
                self.events.push(CourseEvent::step_changed(demo.view()));
                self.record_completion(&demo_type);
            }
            Transition::Ignored => {}
        }
        transition
    }

    /// Goes back one step; ignored at step 0.
    pub fn previous_step(&mut self) -> Transition {
        let Some(demo) = self.current.as_mut() else {
            return Transition::Ignored;
        };
        let transition = demo.previous_step();
        if transition.is_moved() {
            self.events.push(CourseEvent::step_changed(demo.view()));
        }
        transition
    }

    /// Marks `demo_type` completed.
    ///
    /// Returns `Ok(true)` on the first completion and `Ok(false)` after that.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::UnknownDemo` if the catalog has no such demo.
    pub fn complete_demo(&mut self, demo_type: &str) -> Result<bool> {
        self.catalog.get(demo_type)?;
        Ok(self.record_completion(demo_type))
    }

    /// Marks the current demonstration completed.
    ///
    /// Returns `None` when no demonstration is loaded.
    pub fn complete_current_demo(&mut self) -> Option<bool> {
        let demo_type = self.current.as_ref()?.demo_type().to_string();
        Some(self.record_completion(&demo_type))
    }

    fn record_completion(&mut self, demo_type: &str) -> bool {
        let first_time = self.tracker.complete_demo(demo_type);
        self.commit();
        first_time
    }

    /// Loads the demo after the current one, wrapping to the first.
    ///
    /// # Errors
    ///
    /// Propagates [`Session::load_demo`] errors.
    pub fn next_demo(&mut self) -> Result<DemoView> {
        let current = self.current.as_ref().map_or("", Demonstration::demo_type);
        let next = self
            .catalog
            .next_demo_after(current)
            .map(str::to_string)
            .ok_or_else(|| CourseError::unknown_demo(current))?;
        self.load_demo(&next)
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Runs a submission and counts it toward progress.
    ///
    /// Only counted runs touch the progress record. Reaching the execution
    /// milestone awards code-runner.
    pub fn run_code(&mut self, code: &str, tag: Option<&str>) -> Execution {
        let execution = self.simulator.run(code, tag);
        self.events.push(CourseEvent::code_executed(execution.clone()));

        if execution.counted {
            self.tracker.record_code_execution();
            if execution.milestone_reached
                && self.tracker.state().code_executions >= self.simulator.milestone()
            {
                if let Err(e) = self.tracker.award_achievement(CODE_RUNNER) {
                    warn!(error = %e, "Could not award execution milestone");
                }
            }
            self.commit();
        }
        execution
    }

    /// Records a finished exercise.
    pub fn record_exercise_completion(&mut self, had_errors: bool) {
        self.tracker.record_exercise_completion(had_errors);
        self.commit();
    }

    /// Records a requested hint.
    pub fn record_hint_used(&mut self) {
        self.tracker.record_hint_used();
        self.commit();
    }

    /// Awards an achievement by id.
    ///
    /// Returns `Ok(true)` if it was newly unlocked.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::UnknownAchievement` for ids outside the book.
    pub fn award_achievement(&mut self, id: &str) -> Result<bool> {
        let awarded = self.tracker.award_achievement(id)?;
        self.commit();
        Ok(awarded)
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    /// Summary statistics.
    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        self.tracker.stats()
    }

    /// Statistics plus derived insights.
    #[must_use]
    pub fn analytics(&self) -> LearningAnalytics {
        self.tracker.analytics()
    }

    /// Earned and outstanding achievements.
    #[must_use]
    pub fn achievements(&self) -> AchievementListing {
        AchievementListing {
            earned: self.tracker.earned_achievements().into_iter().cloned().collect(),
            available: self.tracker.available_achievements().into_iter().cloned().collect(),
        }
    }

    /// The whole session as one serializable value.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            demo: self.current.as_ref().map(Demonstration::view),
            progress: self.tracker.state().clone(),
            stats: self.stats(),
            session_executions: self.simulator.executions(),
            default_language: self.simulator.default_language(),
            load_warning: self.load_warning.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// A portable copy of the progress record.
    #[must_use]
    pub fn export(&self) -> ProgressExport {
        self.tracker.export()
    }

    /// Replaces progress with an export.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ImportVersionMismatch` for a foreign version;
    /// nothing changes in that case.
    pub fn import(&mut self, export: ProgressExport) -> Result<()> {
        self.tracker.import(export)?;
        self.commit();
        Ok(())
    }

    /// Clears all progress and deletes the stored record.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.simulator.reset_counter();
        if let Err(e) = self.store.remove(&self.config.storage_key) {
            warn!(error = %e, "Failed to remove stored progress");
        }
        self.drain_tracker();
    }

    /// Folds the running session into `timeSpent` and persists.
    pub fn end_session(&mut self) {
        self.tracker.end_session();
        self.commit();
        info!(
            time_spent = self.tracker.state().time_spent,
            "Session ended"
        );
    }

    /// Takes the queued events in the order they happened.
    pub fn drain_events(&mut self) -> Vec<CourseEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Moves tracker events into the session queue and persists.
    fn commit(&mut self) {
        self.drain_tracker();
        self.persist();
    }

    fn drain_tracker(&mut self) {
        self.events
            .extend(self.tracker.take_events().into_iter().map(CourseEvent::from));
    }

    fn persist(&mut self) {
        let key = &self.config.storage_key;
        let written = serde_json::to_string(self.tracker.state())
            .map_err(CourseError::from)
            .and_then(|json| self.store.set(key, &json));
        if let Err(e) = written {
            warn!(error = %e, "Failed to persist progress");
        }
    }
}

/// Reads the record under `key`; an absent key is a fresh record.
fn load_state(store: &dyn KeyValueStore, key: &str) -> Result<ProgressState> {
    let Some(raw) = store.get(key)? else {
        return Ok(ProgressState::default());
    };
    serde_json::from_str(&raw).map_err(|e| CourseError::malformed_state(key, e.to_string()))
}
