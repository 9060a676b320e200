//! JSON report generation.
//!
//! [`JsonGenerator`] serializes a [`ProgressReport`] as compact single-line
//! JSON or pretty-printed for people.
//!
//! # Example
//!
//! ```rust
//! use coursekit_report::{ProgressReport, ReportSummary};
//! use coursekit_report::json::JsonGenerator;
//!
//! let report = ProgressReport::builder()
//!     .course_name("Foundations")
//!     .summary(ReportSummary::default())
//!     .build()
//!     .unwrap();
//!
//! let generator = JsonGenerator::new(&report);
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ProgressReport, ReportError, Result};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a JSON generator for `report`.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates compact JSON (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the report to `path`, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{AchievementEntry, DemoEntry, Insights, ReportSummary};

    fn sample_report() -> ProgressReport {
        ProgressReport::builder()
            .course_name("Foundations")
            .generated_at(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap())
            .summary(ReportSummary {
                completed_demos: 1,
                total_demos: 2,
                completion_rate: 50,
                skill_points: 25,
                skill_level: "Learning".to_string(),
                time_spent_minutes: 42,
                streak_days: 2,
                exercises_completed: 3,
                code_executions: 12,
                accuracy: 67,
            })
            .demos(vec![
                DemoEntry::new("variables", "Variables & Data Types", true),
                DemoEntry::new("functions", "Functions & Logic", false),
            ])
            .achievement(AchievementEntry {
                id: "first-step".to_string(),
                title: "First Steps".to_string(),
                icon: "🎯".to_string(),
                points: 10,
                earned: true,
            })
            .insights(Insights {
                average_minutes_per_demo: 42,
                learning_velocity: 0.5,
                strong_areas: vec!["Variables & Data Types".to_string()],
                improvement_areas: vec!["Consistent Practice".to_string()],
                next_milestone: Some("Explorer".to_string()),
            })
            .build()
            .unwrap()
    }

    fn scratch_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "coursekit-report-{}-{name}",
            std::process::id()
        ))
    }

    #[test]
    fn test_generate_compact() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.starts_with(r#"{"courseName":"Foundations","generatedAt":"2026-10-19T12:00:00Z""#));
    }

    #[test]
    fn test_generate_pretty_round_trips() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();
        assert!(json.contains("\n  \"summary\": {"));

        let parsed: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summary, report.summary);
        assert_eq!(parsed.demos, report.demos);
        assert_eq!(parsed.insights, report.insights);
    }

    #[test]
    fn test_json_snapshot() {
        let report = sample_report();
        let value: serde_json::Value =
            serde_json::from_str(&JsonGenerator::new(&report).generate().unwrap()).unwrap();
        insta::assert_json_snapshot!(value["insights"], @r###"
        {
          "averageMinutesPerDemo": 42,
          "learningVelocity": 0.5,
          "strongAreas": [
            "Variables & Data Types"
          ],
          "improvementAreas": [
            "Consistent Practice"
          ],
          "nextMilestone": "Explorer"
        }
        "###);
    }

    #[test]
    fn test_write_to_file() {
        let report = sample_report();
        let path = scratch_file("report.json");

        JsonGenerator::new(&report).write_to_file(&path, true).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(content.contains("\"courseName\": \"Foundations\""));
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let report = sample_report();
        let path = scratch_file("missing-dir").join("report.json");

        let result = JsonGenerator::new(&report).write_to_file(&path, false);
        assert!(matches!(result, Err(ReportError::Io(_))));
    }
}
