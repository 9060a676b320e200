//! Markdown report generation.
//!
//! [`MarkdownGenerator`] renders a [`ProgressReport`] as a Markdown document
//! with these sections:
//!
//! - A summary table with the headline numbers
//! - A checklist of demos
//! - An achievements table
//! - Learning insights
//!
//! # Example
//!
//! ```rust
//! use coursekit_report::{MarkdownGenerator, ProgressReport, ReportSummary};
//!
//! let report = ProgressReport::builder()
//!     .course_name("Foundations")
//!     .summary(ReportSummary::default())
//!     .build()
//!     .unwrap();
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Course Progress Report: Foundations"));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{AchievementEntry, DemoEntry, ProgressReport};

/// Cells in the textual progress bar.
const PROGRESS_BAR_WIDTH: u32 = 10;

/// Generates Markdown from a progress report.
pub struct MarkdownGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    ///
    /// The footer carries the report's own generation time, so the same
    /// report always renders to the same text.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_demos(&mut output);
        self.write_achievements(&mut output);
        self.write_insights(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Course Progress Report: {}\n",
            escape_markdown(&self.report.course_name)
        );
    }

    /// Writes the summary section with metrics table.
    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let counts = self.report.achievement_counts();

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(
            output,
            "| Progress | {} {}/{} demos ({}%) |",
            progress_bar(summary.completion_rate),
            summary.completed_demos,
            summary.total_demos,
            summary.completion_rate
        );
        let _ = writeln!(
            output,
            "| Skill Level | {} ({} points) |",
            escape_markdown(&summary.skill_level),
            summary.skill_points
        );
        let _ = writeln!(
            output,
            "| Time Spent | {} |",
            format_minutes(summary.time_spent_minutes)
        );
        let _ = writeln!(output, "| Streak | {} |", format_days(summary.streak_days));
        let _ = writeln!(
            output,
            "| Exercises | {} completed ({}% accuracy) |",
            summary.exercises_completed, summary.accuracy
        );
        let _ = writeln!(output, "| Code Runs | {} |", summary.code_executions);
        let _ = writeln!(
            output,
            "| Achievements | {}/{} |",
            counts.earned, counts.total
        );
        let _ = writeln!(output);
    }

    fn write_demos(&self, output: &mut String) {
        let _ = writeln!(output, "## Demos\n");

        if self.report.demos.is_empty() {
            let _ = writeln!(output, "*No demos in this course.*\n");
            return;
        }

        for demo in &self.report.demos {
            Self::write_demo_entry(output, demo);
        }
        let _ = writeln!(output);
    }

    fn write_demo_entry(output: &mut String, demo: &DemoEntry) {
        let mark = if demo.completed { 'x' } else { ' ' };
        let _ = writeln!(
            output,
            "- [{mark}] {} (`{}`)",
            escape_markdown(&demo.title),
            escape_markdown_inline_code(&demo.demo_type)
        );
    }

    fn write_achievements(&self, output: &mut String) {
        let _ = writeln!(output, "## Achievements\n");

        if self.report.achievements.is_empty() {
            let _ = writeln!(output, "*No achievements defined.*\n");
            return;
        }

        let _ = writeln!(output, "| | Achievement | Points | Status |");
        let _ = writeln!(output, "|---|-------------|--------|--------|");
        for achievement in &self.report.achievements {
            Self::write_achievement_entry(output, achievement);
        }
        let _ = writeln!(output);
    }

    fn write_achievement_entry(output: &mut String, achievement: &AchievementEntry) {
        let status = if achievement.earned { "Earned" } else { "Locked" };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {status} |",
            achievement.icon,
            escape_markdown(&achievement.title),
            achievement.points
        );
    }

    /// Writes the insights section.
    fn write_insights(&self, output: &mut String) {
        let insights = &self.report.insights;

        let _ = writeln!(output, "## Insights\n");
        let _ = writeln!(
            output,
            "- **Average time per demo**: {}",
            format_minutes(insights.average_minutes_per_demo)
        );
        let _ = writeln!(
            output,
            "- **Learning velocity**: {:.2} demos per day",
            insights.learning_velocity
        );
        let _ = writeln!(
            output,
            "- **Strong areas**: {}",
            join_or(&insights.strong_areas, "*none yet*")
        );
        let _ = writeln!(
            output,
            "- **Focus next on**: {}",
            join_or(&insights.improvement_areas, "*nothing flagged*")
        );
        let milestone = insights
            .next_milestone
            .as_deref()
            .map_or_else(|| "*all achievements earned*".to_string(), escape_markdown);
        let _ = writeln!(output, "- **Next milestone**: {milestone}");
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by coursekit at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a minute count.
///
/// Examples:
/// - 42 -> "42m"
/// - 65 -> "1h 5m"
/// - 120 -> "2h"
fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if mins > 0 || parts.is_empty() {
        parts.push(format!("{mins}m"));
    }

    parts.join(" ")
}

fn format_days(days: u32) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{days} days")
    }
}

/// Formats a timestamp as "YYYY-MM-DD HH:MM:SS UTC".
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Renders a percentage as `[####------]`.
fn progress_bar(percent: u32) -> String {
    let filled = (percent.min(100) * PROGRESS_BAR_WIDTH / 100) as usize;
    let empty = PROGRESS_BAR_WIDTH as usize - filled;
    format!("`[{}{}]`", "#".repeat(filled), "-".repeat(empty))
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items
            .iter()
            .map(|item| escape_markdown(item))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Escapes special Markdown characters in text.
///
/// This prevents user content from being interpreted as Markdown formatting.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            // Table cells cannot hold raw newlines
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

/// Inline code only needs backticks neutralised.
fn escape_markdown_inline_code(text: &str) -> String {
    text.replace('`', "'")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{Insights, ReportSummary};

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
                time_spent_minutes: 65,
                streak_days: 1,
                exercises_completed: 3,
                code_executions: 12,
                accuracy: 67,
            })
            .demos(vec![
                DemoEntry::new("variables", "Variables & Data Types", true),
                DemoEntry::new("functions", "Functions & Logic", false),
            ])
            .achievements(vec![
                AchievementEntry {
                    id: "first-step".to_string(),
                    title: "First Steps".to_string(),
                    icon: "🎯".to_string(),
                    points: 10,
                    earned: true,
                },
                AchievementEntry {
                    id: "explorer".to_string(),
                    title: "Explorer".to_string(),
                    icon: "🧭".to_string(),
                    points: 15,
                    earned: false,
                },
            ])
            .insights(Insights {
                average_minutes_per_demo: 65,
                learning_velocity: 1.0,
                strong_areas: vec!["Variables & Data Types".to_string()],
                improvement_areas: vec!["Consistent Practice".to_string()],
                next_milestone: Some("Explorer".to_string()),
            })
            .build()
            .unwrap()
    }

    // ------------------------------------------------------------------------
    // Full document
    // ------------------------------------------------------------------------

    #[test]
    fn test_full_report_snapshot() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();
        insta::assert_snapshot!(markdown, @r###"
        # Course Progress Report: Foundations

        ## Summary

        | Metric | Value |
        |--------|-------|
        | Progress | `[#####-----]` 1/2 demos (50%) |
        | Skill Level | Learning (25 points) |
        | Time Spent | 1h 5m |
        | Streak | 1 day |
        | Exercises | 3 completed (67% accuracy) |
        | Code Runs | 12 |
        | Achievements | 1/2 |

        ## Demos

        - [x] Variables & Data Types (`variables`)
        - [ ] Functions & Logic (`functions`)

        ## Achievements

        | | Achievement | Points | Status |
        |---|-------------|--------|--------|
        | 🎯 | First Steps | 10 | Earned |
        | 🧭 | Explorer | 15 | Locked |

        ## Insights

        - **Average time per demo**: 1h 5m
        - **Learning velocity**: 1.00 demos per day
        - **Strong areas**: Variables & Data Types
        - **Focus next on**: Consistent Practice
        - **Next milestone**: Explorer

        ---
        *Generated by coursekit at 2026-10-19 12:00:00 UTC*
        "###);
    }

    #[test]
    fn test_empty_report_placeholders() {
        let report = ProgressReport::builder()
            .course_name("Empty")
            .summary(ReportSummary::default())
            .build()
            .unwrap();
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("*No demos in this course.*"));
        assert!(markdown.contains("*No achievements defined.*"));
        assert!(markdown.contains("| Progress | `[----------]` 0/0 demos (0%) |"));
        assert!(markdown.contains("| Time Spent | 0m |"));
        assert!(markdown.contains("| Streak | 0 days |"));
        assert!(markdown.contains("- **Strong areas**: *none yet*"));
        assert!(markdown.contains("- **Next milestone**: *all achievements earned*"));
    }

    #[test]
    fn test_titles_are_escaped() {
        let report = ProgressReport::builder()
            .course_name("C_ourse")
            .summary(ReportSummary::default())
            .demo(DemoEntry::new("a`b", "Tables | Pipes", false))
            .build()
            .unwrap();
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("# Course Progress Report: C\\_ourse"));
        assert!(markdown.contains("- [ ] Tables \\| Pipes (`a'b`)"));
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(42), "42m");
        assert_eq!(format_minutes(65), "1h 5m");
        assert_eq!(format_minutes(120), "2h");
    }

    #[test]
    fn test_format_days() {
        assert_eq!(format_days(0), "0 days");
        assert_eq!(format_days(1), "1 day");
        assert_eq!(format_days(7), "7 days");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "`[----------]`");
        assert_eq!(progress_bar(33), "`[###-------]`");
        assert_eq!(progress_bar(100), "`[##########]`");
        assert_eq!(progress_bar(250), "`[##########]`");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("*bold*"), "\\*bold\\*");
        assert_eq!(escape_markdown("a|b"), "a\\|b");
        assert_eq!(escape_markdown("line1\nline2"), "line1<br>line2");
        assert_eq!(escape_markdown("plain & simple"), "plain & simple");
    }

    #[test]
    fn test_join_or() {
        assert_eq!(join_or(&[], "none"), "none");
        assert_eq!(
            join_or(&["Git".to_string(), "HTML & CSS".to_string()], "none"),
            "Git, HTML & CSS"
        );
    }
}
