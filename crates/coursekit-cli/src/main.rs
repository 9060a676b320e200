//! coursekit CLI
//!
//! Serves the course API, runs code through the simulator and reports on
//! learner progress from the command line.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use coursekit_core::{
    create_router, AppState, Config, Execution, Language, OutputKind, ProgressExport, Session,
    Transition,
};
use coursekit_report::{
    json::JsonGenerator, AchievementEntry, DemoEntry, Insights, MarkdownGenerator, ProgressReport,
    ReportSummary,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Course name printed in reports.
const COURSE_NAME: &str = "Foundations";

/// coursekit - interactive programming course toolkit
///
/// Tracks lesson progress, awards achievements and runs beginner-level
/// JavaScript and Python through a teaching simulator.
#[derive(Parser, Debug)]
#[command(name = "coursekit")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: coursekit.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory for persisted progress (overrides storageDir)
    #[arg(long, value_name = "DIR", global = true)]
    storage_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API and event stream
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Run a JavaScript or Python file through the simulator
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Language tag (default: inferred from the extension)
        #[arg(short, long)]
        language: Option<String>,

        /// Only check the syntax; nothing runs and nothing is counted
        #[arg(long)]
        check: bool,
    },

    /// Print the starter program for a language
    Template {
        /// Language tag, e.g. `javascript` or `py`
        #[arg(value_name = "LANGUAGE")]
        language: String,
    },

    /// Show a demo's steps, optionally walking it to completion
    Demo {
        /// Demo type, e.g. `variables`
        #[arg(value_name = "TYPE")]
        demo_type: String,

        /// Advance through every step and complete the demo
        #[arg(long)]
        finish: bool,
    },

    /// Print a progress report
    Progress {
        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List earned and available achievements
    Achievements,

    /// Export progress as JSON
    Export {
        /// Write the export to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Replace progress with a previous export
    Import {
        /// Export file to read
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete all progress
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");
    tracing::debug!(storage_dir = ?args.storage_dir, "Storage directory");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.storage_dir)?;
    let mut session = Session::from_config(config)?;

    if let Some(warning) = session.load_warning() {
        eprintln!("Warning: {warning}");
    }

    let result = match args.command {
        Command::Serve { port } => return serve(session, port).await,
        Command::Run {
            file,
            language,
            check,
        } => run_file(&mut session, &file, language.as_deref(), check),
        Command::Template { language } => print_template(&language),
        Command::Demo { demo_type, finish } => show_demo(&mut session, &demo_type, finish),
        Command::Progress { format, output } => {
            write_progress(&session, format, output.as_deref())
        }
        Command::Achievements => {
            print_achievements(&session);
            Ok(())
        }
        Command::Export { output } => export_progress(&session, output.as_deref()),
        Command::Import { file } => import_progress(&mut session, &file),
        Command::Reset => {
            session.reset();
            println!("Progress reset");
            Ok(())
        }
    };

    session.end_session();
    result
}

/// Loads configuration, applies CLI overrides and validates the result.
fn load_config(path: Option<&Path>, storage_dir: Option<String>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    if let Some(dir) = storage_dir {
        config.storage_dir = dir;
    }

    config.validate()?;
    Ok(config)
}

// ============================================================================
// serve
// ============================================================================

async fn serve(session: Session, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let state = AppState::new(session);
    let shared = state.session.clone();
    let router = create_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("coursekit API running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "HTTP server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shared.lock().await.end_session();
    tracing::info!("HTTP server stopped");

    served.map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    }
}

// ============================================================================
// run
// ============================================================================

fn run_file(
    session: &mut Session,
    file: &Path,
    language: Option<&str>,
    check: bool,
) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(file).map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {e}", file.display())
    })?;

    // Unknown extensions fall back to the configured default language
    let tag = language.or_else(|| {
        file.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Language::from_extension)
            .map(Language::as_str)
    });

    if check {
        let language = check_code(session, &code, tag)?;
        println!("{}: valid {language}", file.display());
        return Ok(());
    }

    tracing::debug!(file = %file.display(), tag = ?tag, "Running file");

    let execution = session.run_code(&code, tag);
    print_execution(&execution);

    for event in session.drain_events() {
        tracing::debug!(event = event.event_name(), "Session event");
    }
    Ok(())
}

/// Syntax-checks `code` without running or counting it.
fn check_code(session: &Session, code: &str, tag: Option<&str>) -> anyhow::Result<Language> {
    let language = match tag {
        Some(tag) => tag.parse::<Language>()?,
        None => session.simulator().default_language(),
    };
    session
        .simulator()
        .validate(code, language)
        .map_err(|e| anyhow::anyhow!("{} syntax error: {e}", language.display_name()))?;
    Ok(language)
}

fn print_template(tag: &str) -> anyhow::Result<()> {
    let language = tag.parse::<Language>()?;
    print!("{}", language.template());
    Ok(())
}

fn print_execution(execution: &Execution) {
    if let Some(header) = execution.header() {
        println!("{header}");
    }

    for event in &execution.events {
        match event.kind {
            OutputKind::Log => println!("{}", event.content),
            OutputKind::Error => eprintln!("[error] {}", event.content),
            kind => println!("[{kind}] {}", event.content),
        }
    }
}

// ============================================================================
// demo
// ============================================================================

fn show_demo(session: &mut Session, demo_type: &str, finish: bool) -> anyhow::Result<()> {
    let view = session.load_demo(demo_type)?;
    println!("{} ({} steps)", view.title, view.total_steps);

    if let Some(demo) = session.current_demo() {
        for (index, step) in demo.steps().iter().enumerate() {
            println!("  {}. {} - {}", index + 1, step.title, step.description);
        }
    }

    if finish {
        loop {
            match session.next_step() {
                Transition::Moved { to, .. } => tracing::debug!(step = to, "Advanced"),
                Transition::Completed => {
                    println!("Completed {}", view.title);
                    break;
                }
                Transition::Ignored => break,
            }
        }
    }
    Ok(())
}

// ============================================================================
// progress
// ============================================================================

fn write_progress(
    session: &Session,
    format: ReportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let report = build_report(session)?;

    match (format, output) {
        (ReportFormat::Json, Some(path)) => {
            JsonGenerator::new(&report).write_to_file(path, true)?;
            println!("JSON report: {}", path.display());
        }
        (ReportFormat::Json, None) => {
            println!("{}", JsonGenerator::new(&report).generate_pretty()?);
        }
        (ReportFormat::Markdown, Some(path)) => {
            std::fs::write(path, MarkdownGenerator::new(&report).generate())?;
            println!("Markdown report: {}", path.display());
        }
        (ReportFormat::Markdown, None) => {
            print!("{}", MarkdownGenerator::new(&report).generate());
        }
    }
    Ok(())
}

/// Converts a session into a report.
fn build_report(session: &Session) -> anyhow::Result<ProgressReport> {
    let analytics = session.analytics();
    let stats = &analytics.stats;
    let state = session.state();

    let summary = ReportSummary {
        completed_demos: stats.completed_demos,
        total_demos: stats.total_demos,
        completion_rate: stats.completion_rate,
        skill_points: stats.skill_points,
        skill_level: stats.skill_level.label().to_string(),
        time_spent_minutes: stats.time_spent,
        streak_days: stats.streak_days,
        exercises_completed: stats.exercises_completed,
        code_executions: stats.code_executions,
        accuracy: stats.accuracy,
    };

    let demos = session
        .catalog()
        .iter()
        .map(|demo| DemoEntry::new(&demo.demo_type, &demo.title, state.has_completed(&demo.demo_type)))
        .collect();

    let achievements = session
        .tracker()
        .book()
        .iter()
        .map(|a| AchievementEntry {
            id: a.id.clone(),
            title: a.title.clone(),
            icon: a.icon.clone(),
            points: a.points,
            earned: state.has_achievement(&a.id),
        })
        .collect();

    let insights = Insights {
        average_minutes_per_demo: analytics.average_time_per_demo,
        learning_velocity: analytics.learning_velocity,
        strong_areas: analytics.strong_areas.clone(),
        improvement_areas: analytics.improvement_areas.clone(),
        next_milestone: analytics.next_milestone.as_ref().map(|a| a.title.clone()),
    };

    Ok(ProgressReport::builder()
        .course_name(COURSE_NAME)
        .summary(summary)
        .demos(demos)
        .achievements(achievements)
        .insights(insights)
        .build()?)
}

// ============================================================================
// achievements
// ============================================================================

fn print_achievements(session: &Session) {
    let listing = session.achievements();

    println!("Earned ({}):", listing.earned.len());
    if listing.earned.is_empty() {
        println!("  none yet");
    }
    for a in &listing.earned {
        println!("  {} {} (+{})", a.icon, a.title, a.points);
    }

    println!("Available ({}):", listing.available.len());
    for a in &listing.available {
        println!("  {} {} ({} points)", a.icon, a.title, a.points);
    }
}

// ============================================================================
// export / import
// ============================================================================

fn export_progress(session: &Session, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&session.export())?;

    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Progress exported to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn import_progress(session: &mut Session, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {e}", file.display())
    })?;
    let export: ProgressExport = serde_json::from_str(&content).map_err(|e| {
        anyhow::anyhow!(
            "Invalid export file {}: {e}\n\nSuggestion: Use a file written by 'coursekit export'",
            file.display()
        )
    })?;

    session.import(export)?;
    println!(
        "Imported progress: {} demos completed",
        session.state().completed_demos.len()
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_language() {
        let args = Args::parse_from(["coursekit", "run", "hello.txt", "--language", "python"]);
        match args.command {
            Command::Run {
                file,
                language,
                check,
            } => {
                assert_eq!(file, PathBuf::from("hello.txt"));
                assert_eq!(language.as_deref(), Some("python"));
                assert!(!check);
            }
            other => unreachable!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args = Args::parse_from(["coursekit", "reset", "--storage-dir", "/tmp/x", "-v"]);
        assert!(args.verbose);
        assert_eq!(args.storage_dir.as_deref(), Some("/tmp/x"));
        assert!(matches!(args.command, Command::Reset));
    }

    #[test]
    fn test_parse_progress_defaults() {
        let args = Args::parse_from(["coursekit", "progress"]);
        match args.command {
            Command::Progress { format, output } => {
                assert_eq!(format, ReportFormat::Markdown);
                assert!(output.is_none());
            }
            other => unreachable!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_serve_default_port() {
        let args = Args::parse_from(["coursekit", "serve"]);
        assert!(matches!(args.command, Command::Serve { port: DEFAULT_PORT }));
    }

    #[test]
    fn test_storage_dir_override() {
        let config = load_config(
            Some(Path::new("/nonexistent/coursekit.json")),
            Some("custom-dir".to_string()),
        )
        .unwrap();
        assert_eq!(config.storage_dir, "custom-dir");
    }

    #[test]
    fn test_empty_storage_dir_override_is_rejected() {
        let result = load_config(Some(Path::new("/nonexistent/coursekit.json")), Some(String::new()));
        assert!(result.is_err());
    }

    fn memory_session() -> Session {
        use coursekit_core::{Catalog, MemoryStore};
        use std::sync::Arc;

        Session::open(
            Config::default(),
            Catalog::builtin().unwrap(),
            Box::new(MemoryStore::new()),
            Arc::new(coursekit_core::progress::SystemClock),
        )
    }

    #[test]
    fn test_parse_run_check_and_template() {
        let args = Args::parse_from(["coursekit", "run", "app.js", "--check"]);
        assert!(matches!(args.command, Command::Run { check: true, .. }));

        let args = Args::parse_from(["coursekit", "template", "py"]);
        match args.command {
            Command::Template { language } => assert_eq!(language, "py"),
            other => unreachable!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_check_code_does_not_count() {
        let session = memory_session();

        assert_eq!(
            check_code(&session, "console.log('hi')", None).unwrap(),
            Language::JavaScript
        );
        assert_eq!(
            check_code(&session, "print('hi')", Some("python")).unwrap(),
            Language::Python
        );
        assert!(check_code(&session, "let x = ;", Some("js")).is_err());
        assert!(check_code(&session, "print('hi')", Some("ruby")).is_err());
        assert_eq!(session.state().code_executions, 0);
        assert_eq!(session.simulator().executions(), 0);
    }

    #[test]
    fn test_build_report_from_fresh_session() {
        let session = memory_session();
        let report = build_report(&session).unwrap();

        assert_eq!(report.summary.total_demos, 6);
        assert_eq!(report.demos.len(), 6);
        assert!(report.demos.iter().all(|d| !d.completed));
        assert_eq!(report.achievement_counts().earned, 0);
        assert_eq!(report.insights.next_milestone.as_deref(), Some("First Steps"));
    }
}
