//! Derived statistics and learning analytics.
//!
//! Everything here is a pure projection of a [`ProgressState`]; nothing
//! mutates the tracker.

use serde::{Deserialize, Serialize};

use super::achievements::{AchievementBook, AchievementDefinition};
use super::state::ProgressState;

/// Coarse skill level derived from skill points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    /// Fewer than 25 points.
    Beginner,
    /// 25 to 74 points.
    Learning,
    /// 75 to 149 points.
    Progressing,
    /// 150 to 249 points.
    Advanced,
    /// 250 points or more.
    Expert,
}

impl SkillLevel {
    /// Maps skill points to a level.
    ///
    /// # Examples
    ///
    /// ```
    /// use coursekit_core::SkillLevel;
    ///
    /// assert_eq!(SkillLevel::from_points(0), SkillLevel::Beginner);
    /// assert_eq!(SkillLevel::from_points(75), SkillLevel::Progressing);
    /// assert_eq!(SkillLevel::from_points(900), SkillLevel::Expert);
    /// ```
    #[must_use]
    pub const fn from_points(points: u32) -> Self {
        match points {
            0..=24 => Self::Beginner,
            25..=74 => Self::Learning,
            75..=149 => Self::Progressing,
            150..=249 => Self::Advanced,
            _ => Self::Expert,
        }
    }

    /// Returns the display label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Learning => "Learning",
            Self::Progressing => "Progressing",
            Self::Advanced => "Advanced",
            Self::Expert => "Expert",
        }
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Summary numbers for a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    /// Completed demo count.
    pub completed_demos: u32,
    /// Demos in the catalog.
    pub total_demos: u32,
    /// Completed share of the catalog, rounded percent.
    pub completion_rate: u32,
    /// Unlocked achievement count.
    pub achievements: u32,
    /// Achievements in the book.
    pub total_achievements: u32,
    /// Current skill points.
    pub skill_points: u32,
    /// Minutes spent including the running session.
    pub time_spent: u64,
    /// Current streak.
    pub streak_days: u32,
    /// Level derived from skill points.
    pub skill_level: SkillLevel,
    /// Exercises completed.
    pub exercises_completed: u32,
    /// Counted code executions.
    pub code_executions: u32,
    /// Share of exercises without errors, rounded percent.
    pub accuracy: u32,
}

/// Statistics plus the derived learning insights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningAnalytics {
    /// The underlying statistics.
    #[serde(flatten)]
    pub stats: ProgressStats,
    /// Minutes per completed demo, rounded.
    pub average_time_per_demo: u64,
    /// Completed demos per streak day, one decimal.
    pub learning_velocity: f64,
    /// Topics the learner has covered.
    pub strong_areas: Vec<String>,
    /// Habits worth improving.
    pub improvement_areas: Vec<String>,
    /// Cheapest achievement still to earn.
    pub next_milestone: Option<AchievementDefinition>,
}

/// Computes [`ProgressStats`] for `state`.
///
/// `total_minutes` already includes the running session.
#[must_use]
pub fn compute_stats(
    state: &ProgressState,
    book: &AchievementBook,
    total_demos: u32,
    total_minutes: u64,
) -> ProgressStats {
    let completed = to_u32(state.completed_demos.len());
    ProgressStats {
        completed_demos: completed,
        total_demos,
        completion_rate: percent(u64::from(completed), u64::from(total_demos)),
        achievements: to_u32(state.achievements.len()),
        total_achievements: to_u32(book.len()),
        skill_points: state.skill_points,
        time_spent: total_minutes,
        streak_days: state.streak_days,
        skill_level: SkillLevel::from_points(state.skill_points),
        exercises_completed: state.exercises_completed,
        code_executions: state.code_executions,
        accuracy: accuracy(state),
    }
}

/// Computes [`LearningAnalytics`] on top of precomputed stats.
#[must_use]
pub fn compute_analytics(
    state: &ProgressState,
    book: &AchievementBook,
    stats: ProgressStats,
) -> LearningAnalytics {
    let average_time_per_demo = if stats.completed_demos == 0 {
        0
    } else {
        div_round(stats.time_spent, u64::from(stats.completed_demos))
    };

    LearningAnalytics {
        average_time_per_demo,
        learning_velocity: learning_velocity(state),
        strong_areas: strong_areas(state),
        improvement_areas: improvement_areas(state),
        next_milestone: book.next_milestone(state).cloned(),
        stats,
    }
}

/// Accuracy in percent; 100 when no exercise has been done yet.
#[must_use]
pub fn accuracy(state: &ProgressState) -> u32 {
    if state.exercises_completed == 0 {
        return 100;
    }
    let correct = state.exercises_completed.saturating_sub(state.mistakes_made);
    percent(u64::from(correct), u64::from(state.exercises_completed))
}

/// Completed demos per streak day, rounded to one decimal.
#[must_use]
pub fn learning_velocity(state: &ProgressState) -> f64 {
    let sessions = f64::from(state.streak_days.max(1));
    #[allow(clippy::cast_precision_loss)]
    let completed = state.completed_demos.len() as f64;
    (completed / sessions * 10.0).round() / 10.0
}

/// Topic labels for completed built-in demos, in catalog order.
#[must_use]
pub fn strong_areas(state: &ProgressState) -> Vec<String> {
    const AREAS: [(&str, &str); 6] = [
        ("variables", "Variables & Data Types"),
        ("functions", "Functions & Logic"),
        ("algorithms", "Problem Solving"),
        ("html-css", "Web Development"),
        ("git", "Version Control"),
        ("web-project", "Project Development"),
    ];

    AREAS
        .iter()
        .filter(|(demo, _)| state.has_completed(demo))
        .map(|(_, label)| (*label).to_string())
        .collect()
}

/// Habits the learner could improve.
#[must_use]
pub fn improvement_areas(state: &ProgressState) -> Vec<String> {
    let exercises = u64::from(state.exercises_completed);
    let mut areas = Vec::new();

    // mistakes > 0.3 * exercises, kept in integers
    if u64::from(state.mistakes_made) * 10 > exercises * 3 {
        areas.push("Code Accuracy".to_string());
    }
    // hints > 0.5 * exercises
    if u64::from(state.hints_used) * 2 > exercises {
        areas.push("Problem Solving Independence".to_string());
    }
    if state.streak_days < 3 {
        areas.push("Consistent Practice".to_string());
    }

    areas
}

/// `part / whole` as a rounded percentage (0 when `whole` is 0).
fn percent(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    u32::try_from(div_round(part * 100, whole)).unwrap_or(u32::MAX)
}

/// Integer division rounding half up.
const fn div_round(n: u64, d: u64) -> u64 {
    (n * 2 + d) / (d * 2)
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
