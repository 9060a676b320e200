//! Achievement definitions and their unlock conditions.
//!
//! Conditions are data ([`Condition`]) rather than closures, so the whole
//! book can be listed over the API and reasoned about in tests.

use serde::{Deserialize, Serialize};

use super::state::ProgressState;

/// Unlocked after the first completed demo.
pub const FIRST_STEP: &str = "first-step";
/// Unlocked after the execution milestone is reached.
pub const CODE_RUNNER: &str = "code-runner";
/// Unlocked after every catalog demo is completed.
pub const PROBLEM_SOLVER: &str = "problem-solver";
/// Unlocked by finishing a demo quickly.
pub const SPEED_LEARNER: &str = "speed-learner";

/// A predicate over [`ProgressState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Condition {
    /// At least this many demos completed.
    CompletedDemos(u32),
    /// At least this many counted code executions.
    CodeExecutions(u32),
    /// At least this many exercises and no mistakes.
    FlawlessExercises(u32),
    /// A streak of at least this many days.
    StreakDays(u32),
    /// Never holds on its own; awarded by an external trigger.
    Manual,
}

impl Condition {
    /// Evaluates the condition against `state`.
    #[must_use]
    pub fn holds(&self, state: &ProgressState) -> bool {
        match *self {
            Self::CompletedDemos(n) => count(state.completed_demos.len()) >= n,
            Self::CodeExecutions(n) => state.code_executions >= n,
            Self::FlawlessExercises(n) => state.exercises_completed >= n && state.mistakes_made == 0,
            Self::StreakDays(n) => state.streak_days >= n,
            Self::Manual => false,
        }
    }

    /// Returns `true` for conditions that can never hold by themselves.
    #[must_use]
    pub const fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Static metadata for one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    /// Stable identifier stored in progress records.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Display icon.
    pub icon: String,
    /// Skill points granted when unlocked.
    pub points: u32,
    /// Unlock condition.
    pub condition: Condition,
}

impl AchievementDefinition {
    fn new(id: &str, title: &str, icon: &str, points: u32, condition: Condition) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            icon: icon.to_string(),
            points,
            condition,
        }
    }
}

/// The ordered set of achievements a tracker can award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementBook {
    definitions: Vec<AchievementDefinition>,
}

impl AchievementBook {
    /// Builds the standard book.
    ///
    /// `total_demos` is the catalog size needed for problem-solver and
    /// `execution_milestone` the run count needed for code-runner.
    #[must_use]
    pub fn standard(total_demos: u32, execution_milestone: u32) -> Self {
        use Condition::{CodeExecutions, CompletedDemos, FlawlessExercises, Manual, StreakDays};

        Self {
            definitions: vec![
                AchievementDefinition::new(FIRST_STEP, "First Steps", "🎯", 10, CompletedDemos(1)),
                AchievementDefinition::new(
                    CODE_RUNNER,
                    "Code Runner",
                    "🏃",
                    15,
                    CodeExecutions(execution_milestone),
                ),
                AchievementDefinition::new(
                    PROBLEM_SOLVER,
                    "Problem Solver",
                    "🧩",
                    50,
                    CompletedDemos(total_demos),
                ),
                AchievementDefinition::new(SPEED_LEARNER, "Speed Learner", "⚡", 20, Manual),
                AchievementDefinition::new(
                    "perfectionist",
                    "Perfectionist",
                    "💎",
                    30,
                    FlawlessExercises(10),
                ),
                AchievementDefinition::new("collaborator", "Collaborator", "🤝", 25, Manual),
                AchievementDefinition::new("persistent", "Persistent Learner", "🔥", 20, StreakDays(3)),
                AchievementDefinition::new("explorer", "Explorer", "🗺️", 15, Manual),
                AchievementDefinition::new("debugger", "Debugger", "🐛", 25, Manual),
                AchievementDefinition::new("mentor", "Mentor", "🎓", 40, Manual),
            ],
        }
    }

    /// Creates a book from explicit definitions.
    #[must_use]
    pub fn from_definitions(definitions: Vec<AchievementDefinition>) -> Self {
        Self { definitions }
    }

    /// Looks up a definition by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    /// Iterates definitions in book order.
    pub fn iter(&self) -> impl Iterator<Item = &AchievementDefinition> {
        self.definitions.iter()
    }

    /// Returns the number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Ids whose condition holds for `state` but are not yet unlocked.
    ///
    /// Manual conditions are skipped entirely.
    #[must_use]
    pub fn newly_satisfied(&self, state: &ProgressState) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|d| !d.condition.is_manual())
            .filter(|d| !state.has_achievement(&d.id) && d.condition.holds(state))
            .map(|d| d.id.clone())
            .collect()
    }

    /// Definitions not yet unlocked in `state`, in book order.
    #[must_use]
    pub fn available<'a>(&'a self, state: &ProgressState) -> Vec<&'a AchievementDefinition> {
        self.definitions
            .iter()
            .filter(|d| !state.has_achievement(&d.id))
            .collect()
    }

    /// The cheapest achievement still to earn; ties go to the earlier entry.
    #[must_use]
    pub fn next_milestone<'a>(&'a self, state: &ProgressState) -> Option<&'a AchievementDefinition> {
        self.available(state)
            .into_iter()
            .reduce(|best, d| if d.points < best.points { d } else { best })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn book() -> AchievementBook {
        AchievementBook::standard(6, 10)
    }

    #[test]
    fn test_standard_book_contents() {
        let book = book();
        assert_eq!(book.len(), 10);

        let runner = book.get(CODE_RUNNER).unwrap();
        assert_eq!(runner.points, 15);
        assert_eq!(runner.condition, Condition::CodeExecutions(10));

        let solver = book.get(PROBLEM_SOLVER).unwrap();
        assert_eq!(solver.points, 50);
        assert_eq!(solver.condition, Condition::CompletedDemos(6));

        assert!(book.get(SPEED_LEARNER).unwrap().condition.is_manual());
        assert!(book.get("nonexistent").is_none());
    }

    #[test]
    fn test_conditions() {
        let mut state = ProgressState::new();
        assert!(!Condition::CompletedDemos(1).holds(&state));

        state.completed_demos.insert("variables".to_string());
        assert!(Condition::CompletedDemos(1).holds(&state));

        state.exercises_completed = 10;
        assert!(Condition::FlawlessExercises(10).holds(&state));
        state.mistakes_made = 1;
        assert!(!Condition::FlawlessExercises(10).holds(&state));

        state.streak_days = 3;
        assert!(Condition::StreakDays(3).holds(&state));
        assert!(!Condition::Manual.holds(&state));
    }

    #[test]
    fn test_newly_satisfied_skips_held_and_manual() {
        let book = book();
        let mut state = ProgressState::new();
        state.completed_demos.insert("git".to_string());
        state.streak_days = 5;

        let ids = book.newly_satisfied(&state);
        assert_eq!(ids, vec![FIRST_STEP.to_string(), "persistent".to_string()]);

        state.achievements.insert(FIRST_STEP.to_string());
        assert_eq!(book.newly_satisfied(&state), vec!["persistent".to_string()]);
    }

    #[test]
    fn test_next_milestone_prefers_cheapest_then_book_order() {
        let book = book();
        let mut state = ProgressState::new();

        assert_eq!(book.next_milestone(&state).unwrap().id, FIRST_STEP);

        state.achievements.insert(FIRST_STEP.to_string());
        // code-runner and explorer both cost 15; code-runner comes first
        assert_eq!(book.next_milestone(&state).unwrap().id, CODE_RUNNER);

        for d in book.iter() {
            state.achievements.insert(d.id.clone());
        }
        assert!(book.next_milestone(&state).is_none());
    }

    #[test]
    fn test_condition_serialization() {
        let json = serde_json::to_string(&Condition::CodeExecutions(10)).unwrap();
        assert_eq!(json, r#"{"kind":"code_executions","value":10}"#);
        let json = serde_json::to_string(&Condition::Manual).unwrap();
        assert_eq!(json, r#"{"kind":"manual"}"#);
    }
}
