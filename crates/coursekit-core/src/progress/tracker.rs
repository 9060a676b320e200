//! The progress state machine.
//!
//! [`ProgressTracker`] owns a [`ProgressState`] and applies the recording
//! operations to it. After every mutation it re-checks the whole
//! achievement book and awards whatever newly holds. Each award adds the
//! achievement's points once and queues exactly one
//! [`ProgressEvent::AchievementUnlocked`].
//!
//! The tracker never renders or persists. Hosts drain the queued events with
//! [`ProgressTracker::take_events`] and write [`ProgressTracker::state`] back
//! to storage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::achievements::{AchievementBook, AchievementDefinition, SPEED_LEARNER};
use super::clock::Clock;
use super::state::{next_streak, ProgressState};
use super::stats::{compute_analytics, compute_stats, LearningAnalytics, ProgressStats};
use crate::error::{CourseError, Result};

/// Export format version understood by [`ProgressTracker::import`].
pub const EXPORT_VERSION: &str = "1.0";

/// Skill points for an exercise finished without errors.
const EXERCISE_POINTS: u32 = 5;

/// Skill points for an exercise finished with errors.
const EXERCISE_POINTS_WITH_ERRORS: u32 = 3;

// ============================================================================
// Events
// ============================================================================

/// Notifications produced by tracker mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ProgressEvent {
    /// An achievement was unlocked.
    AchievementUnlocked(AchievementDefinition),
    /// A demo was completed for the first time.
    DemoCompleted {
        /// The completed demo type.
        demo_type: String,
    },
    /// The streak changed at session start.
    StreakUpdated {
        /// The new streak length.
        streak_days: u32,
    },
    /// All progress was cleared.
    ProgressReset,
}

// ============================================================================
// Export
// ============================================================================

/// A portable snapshot of progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressExport {
    /// The exported progress fields.
    #[serde(flatten)]
    pub state: ProgressState,
    /// When the export was produced.
    #[serde(default)]
    pub export_date: Option<DateTime<Utc>>,
    /// Export format version.
    #[serde(default)]
    pub version: String,
}

// ============================================================================
// Tracker
// ============================================================================

/// Scoring knobs that are not part of the achievement book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    /// Completing a demo within this many minutes of loading it earns speed-learner.
    pub speed_learner_minutes: u32,
    /// Bonus points for each newly completed demo.
    pub demo_completion_points: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            speed_learner_minutes: 30,
            demo_completion_points: 0,
        }
    }
}

/// Tracks progress, streaks and achievements for one learner.
#[derive(Debug)]
pub struct ProgressTracker {
    state: ProgressState,
    book: AchievementBook,
    total_demos: u32,
    rules: ScoringRules,
    clock: Arc<dyn Clock>,
    session_started_at: DateTime<Utc>,
    active_demo: Option<(String, DateTime<Utc>)>,
    events: Vec<ProgressEvent>,
}

impl ProgressTracker {
    /// Creates a tracker over an already loaded state.
    #[must_use]
    pub fn new(
        state: ProgressState,
        book: AchievementBook,
        total_demos: u32,
        rules: ScoringRules,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_started_at = clock.now();
        Self {
            state,
            book,
            total_demos,
            rules,
            clock,
            session_started_at,
            active_demo: None,
            events: Vec::new(),
        }
    }

    /// Returns the current progress record.
    #[must_use]
    pub const fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Returns the achievement book.
    #[must_use]
    pub const fn book(&self) -> &AchievementBook {
        &self.book
    }

    /// Returns the number of demos in the catalog.
    #[must_use]
    pub const fn total_demos(&self) -> u32 {
        self.total_demos
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    /// Starts a session: updates the streak and re-checks achievements.
    ///
    /// Call once per session. Step navigation never touches the streak.
    pub fn start_session(&mut self) {
        let now = self.clock.now();
        let today = now.date_naive();
        let previous = self.state.streak_days;

        self.state.streak_days = next_streak(self.state.last_access_date, today, previous);
        self.state.last_access_date = Some(today);
        self.session_started_at = now;

        if self.state.streak_days != previous {
            debug!(from = previous, to = self.state.streak_days, "Streak updated");
            self.events.push(ProgressEvent::StreakUpdated {
                streak_days: self.state.streak_days,
            });
        }
        self.check_achievements();
    }

    /// Minutes elapsed in the running session.
    #[must_use]
    pub fn session_minutes(&self) -> u64 {
        let elapsed = self.clock.now() - self.session_started_at;
        u64::try_from(elapsed.num_minutes()).unwrap_or(0)
    }

    /// Minutes from finished sessions plus the running one.
    #[must_use]
    pub fn total_minutes(&self) -> u64 {
        self.state.time_spent.saturating_add(self.session_minutes())
    }

    /// Folds the running session into `time_spent` and restarts the session clock.
    pub fn end_session(&mut self) {
        self.state.time_spent = self.total_minutes();
        self.session_started_at = self.clock.now();
    }

    // ------------------------------------------------------------------------
    // Recording operations
    // ------------------------------------------------------------------------

    /// Notes that `demo_type` was just loaded, for the speed-learner window.
    pub fn start_demo(&mut self, demo_type: &str) {
        self.active_demo = Some((demo_type.to_string(), self.clock.now()));
    }

    /// Marks `demo_type` completed.
    ///
    /// Returns `true` on the first completion. Completing an already
    /// completed demo changes nothing but still re-checks achievements.
    pub fn complete_demo(&mut self, demo_type: &str) -> bool {
        if self.state.has_completed(demo_type) {
            self.check_achievements();
            return false;
        }

        self.state.completed_demos.insert(demo_type.to_string());
        self.state.skill_points = self
            .state
            .skill_points
            .saturating_add(self.rules.demo_completion_points);
        info!(
            demo_type,
            completed = self.state.completed_demos.len(),
            "Demo completed"
        );
        self.events.push(ProgressEvent::DemoCompleted {
            demo_type: demo_type.to_string(),
        });

        if self.finished_quickly(demo_type) {
            self.award(SPEED_LEARNER);
        }
        self.check_achievements();
        true
    }

    fn finished_quickly(&self, demo_type: &str) -> bool {
        let Some((active, started_at)) = &self.active_demo else {
            return false;
        };
        if active != demo_type {
            return false;
        }
        let elapsed = self.clock.now() - *started_at;
        elapsed.num_minutes() < i64::from(self.rules.speed_learner_minutes)
    }

    /// Counts one simulator execution.
    pub fn record_code_execution(&mut self) {
        self.state.code_executions = self.state.code_executions.saturating_add(1);
        self.check_achievements();
    }

    /// Counts a finished exercise.
    ///
    /// Grants 5 points, or 3 and a recorded mistake when it had errors.
    pub fn record_exercise_completion(&mut self, had_errors: bool) {
        self.state.exercises_completed = self.state.exercises_completed.saturating_add(1);
        let points = if had_errors {
            self.state.mistakes_made = self.state.mistakes_made.saturating_add(1);
            EXERCISE_POINTS_WITH_ERRORS
        } else {
            EXERCISE_POINTS
        };
        self.state.skill_points = self.state.skill_points.saturating_add(points);
        self.check_achievements();
    }

    /// Counts a requested hint.
    pub fn record_hint_used(&mut self) {
        self.state.hints_used = self.state.hints_used.saturating_add(1);
        self.check_achievements();
    }

    /// Awards an achievement by id.
    ///
    /// Returns `Ok(true)` if it was newly unlocked and `Ok(false)` if it was
    /// already held.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::UnknownAchievement` if `id` is not in the book.
    pub fn award_achievement(&mut self, id: &str) -> Result<bool> {
        if self.book.get(id).is_none() {
            return Err(CourseError::unknown_achievement(id));
        }
        let awarded = self.award(id);
        self.check_achievements();
        Ok(awarded)
    }

    /// Awards every achievement whose condition newly holds.
    ///
    /// Returns the ids unlocked by this check.
    pub fn check_achievements(&mut self) -> Vec<String> {
        let ids = self.book.newly_satisfied(&self.state);
        for id in &ids {
            self.award(id);
        }
        ids
    }

    fn award(&mut self, id: &str) -> bool {
        if self.state.has_achievement(id) {
            return false;
        }
        let Some(definition) = self.book.get(id).cloned() else {
            return false;
        };

        self.state.achievements.insert(definition.id.clone());
        self.state.skill_points = self.state.skill_points.saturating_add(definition.points);
        info!(
            id = %definition.id,
            points = definition.points,
            "Achievement unlocked"
        );
        self.events.push(ProgressEvent::AchievementUnlocked(definition));
        true
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Summary statistics including the running session.
    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        compute_stats(&self.state, &self.book, self.total_demos, self.total_minutes())
    }

    /// Statistics plus derived insights.
    #[must_use]
    pub fn analytics(&self) -> LearningAnalytics {
        compute_analytics(&self.state, &self.book, self.stats())
    }

    /// Unlocked achievements in unlock order.
    #[must_use]
    pub fn earned_achievements(&self) -> Vec<&AchievementDefinition> {
        self.state
            .achievements
            .iter()
            .filter_map(|id| self.book.get(id))
            .collect()
    }

    /// Achievements still to earn, in book order.
    #[must_use]
    pub fn available_achievements(&self) -> Vec<&AchievementDefinition> {
        self.book.available(&self.state)
    }

    // ------------------------------------------------------------------------
    // Export, import and reset
    // ------------------------------------------------------------------------

    /// Produces a portable snapshot of the current progress.
    #[must_use]
    pub fn export(&self) -> ProgressExport {
        ProgressExport {
            state: self.state.clone(),
            export_date: Some(self.clock.now()),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Replaces the progress with an exported snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ImportVersionMismatch` for any version other
    /// than [`EXPORT_VERSION`]; the current state is left untouched.
    pub fn import(&mut self, export: ProgressExport) -> Result<()> {
        if export.version != EXPORT_VERSION {
            return Err(CourseError::import_version(export.version, EXPORT_VERSION));
        }
        self.state = export.state;
        info!(
            completed = self.state.completed_demos.len(),
            achievements = self.state.achievements.len(),
            "Progress imported"
        );
        self.check_achievements();
        Ok(())
    }

    /// Clears all progress back to defaults.
    pub fn reset(&mut self) {
        self.state = ProgressState::default();
        self.active_demo = None;
        self.session_started_at = self.clock.now();
        info!("Progress reset");
        self.events.push(ProgressEvent::ProgressReset);
    }

    /// Drains the queued events.
    pub fn take_events(&mut self) -> Vec<ProgressEvent> {
        std::mem::take(&mut self.events)
    }
}
