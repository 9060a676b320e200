//! coursekit progress reports
//!
//! This crate turns a learner's progress into a report that can be
//! serialized to JSON for programmatic access or rendered to Markdown for
//! people. It has no dependency on the core crate; callers fill in the model.
//!
//! # Types
//!
//! - [`ProgressReport`] - The complete report
//! - [`ReportSummary`] - Headline numbers
//! - [`DemoEntry`] - One lesson and whether it is done
//! - [`AchievementEntry`] - One achievement and whether it is earned
//! - [`Insights`] - Derived learning insights
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use coursekit_report::{DemoEntry, ProgressReport, ReportSummary};
//! use coursekit_report::json::JsonGenerator;
//!
//! let report = ProgressReport::builder()
//!     .course_name("Foundations")
//!     .summary(ReportSummary {
//!         completed_demos: 1,
//!         total_demos: 6,
//!         completion_rate: 17,
//!         skill_level: "Beginner".to_string(),
//!         ..Default::default()
//!     })
//!     .demo(DemoEntry::new("variables", "Variables & Data Types", true))
//!     .build()
//!     .unwrap();
//!
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"completionRate\": 17"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report
// ============================================================================

/// A learner's progress through one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Name of the course.
    pub course_name: String,

    /// When the report was produced.
    pub generated_at: DateTime<Utc>,

    /// Headline numbers.
    pub summary: ReportSummary,

    /// Every lesson in catalog order.
    pub demos: Vec<DemoEntry>,

    /// Every achievement in book order.
    pub achievements: Vec<AchievementEntry>,

    /// Derived insights.
    pub insights: Insights,
}

impl ProgressReport {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Serializes the report to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Earned and total achievement counts.
    #[must_use]
    pub fn achievement_counts(&self) -> AchievementCounts {
        AchievementCounts {
            earned: self.achievements.iter().filter(|a| a.earned).count(),
            total: self.achievements.len(),
        }
    }

    /// Points from earned achievements.
    #[must_use]
    pub fn achievement_points(&self) -> u32 {
        self.achievements
            .iter()
            .filter(|a| a.earned)
            .map(|a| a.points)
            .sum()
    }

    /// Returns `true` once every listed demo is completed.
    #[must_use]
    pub fn is_course_complete(&self) -> bool {
        !self.demos.is_empty() && self.demos.iter().all(|d| d.completed)
    }
}

/// Earned versus total achievements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AchievementCounts {
    /// Achievements earned.
    pub earned: usize,
    /// Achievements in the book.
    pub total: usize,
}

// ============================================================================
// ReportBuilder
// ============================================================================

/// Builder for constructing [`ProgressReport`] instances.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    course_name: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    summary: Option<ReportSummary>,
    demos: Vec<DemoEntry>,
    achievements: Vec<AchievementEntry>,
    insights: Option<Insights>,
}

impl ReportBuilder {
    /// Sets the course name.
    #[must_use]
    pub fn course_name(mut self, name: impl Into<String>) -> Self {
        self.course_name = Some(name.into());
        self
    }

    /// Sets the generation time; defaults to now.
    #[must_use]
    pub const fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn summary(mut self, summary: ReportSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Adds a demo entry.
    #[must_use]
    pub fn demo(mut self, demo: DemoEntry) -> Self {
        self.demos.push(demo);
        self
    }

    /// Sets all demo entries at once.
    #[must_use]
    pub fn demos(mut self, demos: Vec<DemoEntry>) -> Self {
        self.demos = demos;
        self
    }

    /// Adds an achievement entry.
    #[must_use]
    pub fn achievement(mut self, achievement: AchievementEntry) -> Self {
        self.achievements.push(achievement);
        self
    }

    /// Sets all achievement entries at once.
    #[must_use]
    pub fn achievements(mut self, achievements: Vec<AchievementEntry>) -> Self {
        self.achievements = achievements;
        self
    }

    /// Sets the insights.
    #[must_use]
    pub fn insights(mut self, insights: Insights) -> Self {
        self.insights = Some(insights);
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the course name or summary is
    /// missing, or if the summary counts more completed demos than exist.
    pub fn build(self) -> Result<ProgressReport> {
        let course_name = self
            .course_name
            .ok_or_else(|| ReportError::InvalidData("course_name is required".to_string()))?;

        let summary = self
            .summary
            .ok_or_else(|| ReportError::InvalidData("summary is required".to_string()))?;

        if summary.completed_demos > summary.total_demos {
            return Err(ReportError::InvalidData(format!(
                "{} completed demos exceeds the total of {}",
                summary.completed_demos, summary.total_demos
            )));
        }

        Ok(ProgressReport {
            course_name,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
            summary,
            demos: self.demos,
            achievements: self.achievements,
            insights: self.insights.unwrap_or_default(),
        })
    }
}

// ============================================================================
// ReportSummary
// ============================================================================

/// Headline numbers for a learner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Completed demo count.
    pub completed_demos: u32,
    /// Demos in the catalog.
    pub total_demos: u32,
    /// Completed share, rounded percent.
    pub completion_rate: u32,
    /// Current skill points.
    pub skill_points: u32,
    /// Skill level label.
    pub skill_level: String,
    /// Minutes spent learning.
    pub time_spent_minutes: u64,
    /// Current daily streak.
    pub streak_days: u32,
    /// Exercises completed.
    pub exercises_completed: u32,
    /// Counted code executions.
    pub code_executions: u32,
    /// Exercise accuracy, rounded percent.
    pub accuracy: u32,
}

// ============================================================================
// Entries
// ============================================================================

/// One lesson in the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoEntry {
    /// Demo type tag.
    pub demo_type: String,
    /// Display title.
    pub title: String,
    /// Whether the learner completed it.
    pub completed: bool,
}

impl DemoEntry {
    /// Creates a demo entry.
    #[must_use]
    pub fn new(demo_type: impl Into<String>, title: impl Into<String>, completed: bool) -> Self {
        Self {
            demo_type: demo_type.into(),
            title: title.into(),
            completed,
        }
    }
}

/// One achievement in the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementEntry {
    /// Stable identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Display icon.
    pub icon: String,
    /// Points granted when earned.
    pub points: u32,
    /// Whether the learner earned it.
    pub earned: bool,
}

/// Derived learning insights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    /// Minutes per completed demo.
    pub average_minutes_per_demo: u64,
    /// Completed demos per streak day.
    pub learning_velocity: f64,
    /// Topics the learner has covered.
    pub strong_areas: Vec<String>,
    /// Habits worth improving.
    pub improvement_areas: Vec<String>,
    /// Title of the cheapest achievement still to earn.
    pub next_milestone: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn summary(completed: u32, total: u32) -> ReportSummary {
        ReportSummary {
            completed_demos: completed,
            total_demos: total,
            ..Default::default()
        }
    }

    fn achievement(id: &str, points: u32, earned: bool) -> AchievementEntry {
        AchievementEntry {
            id: id.to_string(),
            title: id.to_string(),
            icon: "*".to_string(),
            points,
            earned,
        }
    }

    #[test]
    fn test_report_builder() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let report = ProgressReport::builder()
            .course_name("Foundations")
            .generated_at(at)
            .summary(summary(1, 2))
            .demo(DemoEntry::new("variables", "Variables", true))
            .demo(DemoEntry::new("functions", "Functions", false))
            .build()
            .unwrap();

        assert_eq!(report.course_name, "Foundations");
        assert_eq!(report.generated_at, at);
        assert_eq!(report.demos.len(), 2);
        assert!(report.insights.strong_areas.is_empty());
        assert!(!report.is_course_complete());
    }

    #[test]
    fn test_report_builder_missing_required_fields() {
        let err = ProgressReport::builder().summary(summary(0, 1)).build().unwrap_err();
        assert!(err.to_string().contains("course_name"));

        let err = ProgressReport::builder().course_name("x").build().unwrap_err();
        assert!(err.to_string().contains("summary"));
    }

    #[test]
    fn test_report_builder_rejects_impossible_summary() {
        let result = ProgressReport::builder()
            .course_name("x")
            .summary(summary(3, 2))
            .build();
        assert!(matches!(result, Err(ReportError::InvalidData(_))));
    }

    #[test]
    fn test_achievement_counts_and_points() {
        let report = ProgressReport::builder()
            .course_name("x")
            .summary(summary(0, 1))
            .achievements(vec![
                achievement("first-step", 10, true),
                achievement("mentor", 40, false),
                achievement("explorer", 15, true),
            ])
            .build()
            .unwrap();

        assert_eq!(
            report.achievement_counts(),
            AchievementCounts { earned: 2, total: 3 }
        );
        assert_eq!(report.achievement_points(), 25);
    }

    #[test]
    fn test_course_complete() {
        let report = ProgressReport::builder()
            .course_name("x")
            .summary(summary(1, 1))
            .demo(DemoEntry::new("git", "Git", true))
            .build()
            .unwrap();
        assert!(report.is_course_complete());

        let empty = ProgressReport::builder()
            .course_name("x")
            .summary(summary(0, 0))
            .build()
            .unwrap();
        assert!(!empty.is_course_complete());
    }

    #[test]
    fn test_report_serialization_is_camel_case() {
        let report = ProgressReport::builder()
            .course_name("x")
            .summary(summary(0, 6))
            .build()
            .unwrap();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"courseName\""));
        assert!(json.contains("\"totalDemos\": 6"));
        assert!(json.contains("\"nextMilestone\": null"));

        let back: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary, report.summary);
    }
}
