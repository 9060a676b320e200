//! Learner progress: the persisted record, achievements, statistics and the
//! tracker that ties them together.

pub mod achievements;
pub mod clock;
pub mod state;
pub mod stats;
pub mod tracker;

pub use achievements::{AchievementBook, AchievementDefinition, Condition};
pub use clock::{Clock, FixedClock, SystemClock};
pub use state::{next_streak, parse_access_date, ProgressState};
pub use stats::{compute_analytics, compute_stats, LearningAnalytics, ProgressStats, SkillLevel};
pub use tracker::{ProgressEvent, ProgressExport, ProgressTracker, ScoringRules, EXPORT_VERSION};
