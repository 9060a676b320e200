//! End-to-end tests for course sessions backed by the file store.
//!
//! Each test opens sessions the way the CLI does, against a scratch
//! storage directory, and checks what survives between them.

use std::path::PathBuf;

use coursekit_core::{
    Config, CourseEvent, JsonFileStore, KeyValueStore, ProgressExport, Session, Transition,
};
use coursekit_report::{DemoEntry, MarkdownGenerator, ProgressReport, ReportSummary};

/// Unique scratch directory removed on drop.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "coursekit-it-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&path);
        Self(path)
    }

    fn config(&self) -> Config {
        Config {
            storage_dir: self.0.to_string_lossy().into_owned(),
            ..Config::default()
        }
    }

    fn progress_file(&self) -> PathBuf {
        JsonFileStore::new(&self.0)
            .path_for("course-progress")
            .expect("default key is valid")
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn open(dir: &ScratchDir) -> Session {
    Session::from_config(dir.config()).expect("built-in catalog loads")
}

// ============================================================================
// Persistence
// ============================================================================

/// Progress recorded in one session is visible in the next.
#[test]
fn test_progress_survives_reopen() {
    let dir = ScratchDir::new("reopen");

    {
        let mut session = open(&dir);
        session.load_demo("variables").expect("demo exists");
        let finished = (0..32).any(|_| session.next_step() == Transition::Completed);
        assert!(finished, "demo never completed");
        let execution = session.run_code("console.log(1 + 1)", Some("javascript"));
        assert!(execution.counted);
        session.record_exercise_completion(false);
        session.end_session();
    }

    assert!(dir.progress_file().exists());

    let session = open(&dir);
    let state = session.state();
    assert!(state.has_completed("variables"));
    assert!(state.has_achievement("first-step"));
    assert_eq!(state.code_executions, 1);
    assert_eq!(state.exercises_completed, 1);
    assert_eq!(state.streak_days, 1);
    assert!(session.load_warning().is_none());
}

/// The session writes camelCase JSON that a browser client could read.
#[test]
fn test_stored_record_is_camel_case_json() {
    let dir = ScratchDir::new("camel");

    let mut session = open(&dir);
    session.record_hint_used();

    let raw = std::fs::read_to_string(dir.progress_file()).expect("record written");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid JSON");
    assert_eq!(value["hintsUsed"], 1);
    assert!(value["completedDemos"].is_array());
    assert!(value["lastAccessDate"].is_string());
}

/// A corrupt record is reported and replaced rather than failing the open.
#[test]
fn test_malformed_record_starts_fresh() {
    let dir = ScratchDir::new("malformed");
    let mut store = JsonFileStore::new(&dir.0);
    store
        .set("course-progress", "{ not json")
        .expect("scratch dir is writable");

    let mut session = open(&dir);
    assert!(session.load_warning().is_some());
    assert!(session.state().completed_demos.is_empty());

    let events = session.drain_events();
    assert!(events.iter().any(|e| matches!(e, CourseEvent::Error(_))));

    let raw = std::fs::read_to_string(dir.progress_file()).expect("record rewritten");
    assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
}

/// Reset deletes the stored record.
#[test]
fn test_reset_removes_record() {
    let dir = ScratchDir::new("reset");

    let mut session = open(&dir);
    session.complete_demo("git").expect("demo exists");
    assert!(dir.progress_file().exists());

    session.reset();
    assert!(!dir.progress_file().exists());
    assert!(session.state().completed_demos.is_empty());
}

// ============================================================================
// Export / Import
// ============================================================================

/// An export taken from one learner's directory restores into another.
#[test]
fn test_export_import_between_directories() {
    let source = ScratchDir::new("export-src");
    let target = ScratchDir::new("export-dst");

    let json = {
        let mut session = open(&source);
        session.complete_demo("functions").expect("demo exists");
        session.complete_demo("algorithms").expect("demo exists");
        serde_json::to_string(&session.export()).expect("export serializes")
    };

    let export: ProgressExport = serde_json::from_str(&json).expect("export parses");
    {
        let mut session = open(&target);
        session.import(export).expect("same version");
    }

    let session = open(&target);
    assert!(session.state().has_completed("functions"));
    assert!(session.state().has_completed("algorithms"));
}

/// A foreign export version is rejected and nothing changes.
#[test]
fn test_import_version_mismatch() {
    let dir = ScratchDir::new("mismatch");
    let mut session = open(&dir);

    let mut export = session.export();
    export.state.completed_demos.insert("git".to_string());
    export.version = "0.0".to_string();

    assert!(session.import(export).is_err());
    assert!(!session.state().has_completed("git"));
}

// ============================================================================
// Simulator milestones
// ============================================================================

/// The tenth counted run unlocks the execution milestone.
#[test]
fn test_execution_milestone_awards_code_runner() {
    let dir = ScratchDir::new("milestone");
    let mut session = open(&dir);

    for i in 0..9 {
        session.run_code(&format!("print({i})"), Some("python"));
    }
    assert!(!session.state().has_achievement("code-runner"));

    let execution = session.run_code("print('ten')", Some("python"));
    assert!(execution.milestone_reached);
    assert!(session.state().has_achievement("code-runner"));

    // Empty code is rejected and not counted
    let execution = session.run_code("   ", Some("python"));
    assert!(!execution.counted);
    assert_eq!(session.state().code_executions, 10);
}

// ============================================================================
// Reporting
// ============================================================================

/// A session's analytics render into a Markdown report.
#[test]
fn test_session_renders_markdown_report() {
    let dir = ScratchDir::new("report");
    let mut session = open(&dir);
    session.complete_demo("variables").expect("demo exists");

    let stats = session.stats();
    let demos = session
        .catalog()
        .iter()
        .map(|d| {
            DemoEntry::new(
                &d.demo_type,
                &d.title,
                session.state().has_completed(&d.demo_type),
            )
        })
        .collect();

    let report = ProgressReport::builder()
        .course_name("Foundations")
        .summary(ReportSummary {
            completed_demos: stats.completed_demos,
            total_demos: stats.total_demos,
            completion_rate: stats.completion_rate,
            skill_points: stats.skill_points,
            skill_level: stats.skill_level.label().to_string(),
            ..ReportSummary::default()
        })
        .demos(demos)
        .build()
        .expect("summary is consistent");

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("1/6 demos (17%)"));
    assert!(markdown.contains("- [x] "));
    assert_eq!(markdown.matches("- [ ] ").count(), 5);
}
