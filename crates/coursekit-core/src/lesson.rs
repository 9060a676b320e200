//! Lesson catalog and demonstration runtime.
//!
//! A [`Catalog`] is plain data: an ordered list of [`DemoDefinition`]s, each
//! an ordered list of [`LessonStep`]s. The built-in foundations catalog is
//! compiled into the library; an external one can be loaded with
//! [`Catalog::load`].
//!
//! A [`Demonstration`] is one running lesson. Its step index always stays
//! inside `[0, steps.len())`; out-of-range navigation is ignored rather than
//! reported. Enter/exit hooks come from a [`StepHooks`] registry and are
//! attached when the demonstration is built, so steps never change after
//! construction.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CourseError, Result};

/// Maximum allowed catalog file size in bytes (256KB).
pub const MAX_CATALOG_SIZE: u64 = 256 * 1024;

/// Source name used in errors about the compiled-in catalog.
const BUILTIN_SOURCE: &str = "<built-in>";

static BUILTIN_CATALOG: &str = include_str!("../catalog/foundations.json");

// ============================================================================
// Steps and demos
// ============================================================================

/// A zero-argument side effect run on step transitions.
pub type StepHook = Arc<dyn Fn() + Send + Sync>;

/// A practice task attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    /// What the learner should do.
    pub description: String,
    /// Language tag of the solution (`javascript`, `html`, `shell`, ...).
    pub language: String,
    /// Reference solution.
    pub solution: String,
}

/// One screen of a demonstration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStep {
    /// Unique key within the demonstration.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Display text.
    pub description: String,
    /// Optional practice task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<Exercise>,
    #[serde(skip)]
    on_enter: Option<StepHook>,
    #[serde(skip)]
    on_exit: Option<StepHook>,
}

impl LessonStep {
    /// Creates a step without an exercise.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            exercise: None,
            on_enter: None,
            on_exit: None,
        }
    }

    /// Returns `true` if an enter hook is attached.
    #[must_use]
    pub const fn has_enter_hook(&self) -> bool {
        self.on_enter.is_some()
    }

    /// Returns `true` if an exit hook is attached.
    #[must_use]
    pub const fn has_exit_hook(&self) -> bool {
        self.on_exit.is_some()
    }
}

impl fmt::Debug for LessonStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LessonStep")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("exercise", &self.exercise.is_some())
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish_non_exhaustive()
    }
}

/// Declarative description of one demonstration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoDefinition {
    /// Identifying tag, e.g. `variables`.
    pub demo_type: String,
    /// Display title.
    pub title: String,
    /// Ordered steps.
    pub steps: Vec<LessonStep>,
}

/// Catalog listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSummary {
    /// Identifying tag.
    pub demo_type: String,
    /// Display title.
    pub title: String,
    /// Number of steps.
    pub step_count: usize,
    /// Number of steps carrying an exercise.
    pub exercise_count: usize,
}

// ============================================================================
// Catalog
// ============================================================================

/// The ordered set of demonstrations a session can load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    demos: Vec<DemoDefinition>,
}

impl Catalog {
    /// Returns the compiled-in foundations catalog.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::CatalogInvalid` if the embedded document does
    /// not parse or validate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG, BUILTIN_SOURCE)
    }

    /// Loads and validates a catalog file.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::CatalogNotFound` if the file doesn't exist.
    /// Returns `CourseError::CatalogTooLarge` if the file exceeds 256KB.
    /// Returns `CourseError::CatalogEncodingError` if the file is not valid UTF-8.
    /// Returns `CourseError::CatalogInvalid` if it does not parse or validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CourseError::catalog_not_found(path)
            } else {
                CourseError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_CATALOG_SIZE {
            return Err(CourseError::catalog_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                CourseError::catalog_encoding(path)
            } else {
                CourseError::Io(e)
            }
        })?;

        Self::from_json(&content, path)
    }

    /// Parses and validates a catalog document.
    ///
    /// `source` only labels errors.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::CatalogInvalid` on parse or validation failure.
    pub fn from_json(content: &str, source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        let catalog: Self = serde_json::from_str(content)
            .map_err(|e| CourseError::catalog_invalid(source, e.to_string()))?;
        catalog.validate(source)?;
        Ok(catalog)
    }

    /// Builds a catalog from definitions after validating them.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::CatalogInvalid` if validation fails.
    pub fn from_demos(demos: Vec<DemoDefinition>) -> Result<Self> {
        let catalog = Self { demos };
        catalog.validate(Path::new("<inline>"))?;
        Ok(catalog)
    }

    fn validate(&self, source: &Path) -> Result<()> {
        if self.demos.is_empty() {
            return Err(CourseError::catalog_invalid(source, "catalog has no demos"));
        }

        let mut demo_types = HashSet::new();
        for demo in &self.demos {
            if !demo_types.insert(demo.demo_type.as_str()) {
                return Err(CourseError::catalog_invalid(
                    source,
                    format!("duplicate demo type '{}'", demo.demo_type),
                ));
            }
            if demo.steps.is_empty() {
                return Err(CourseError::catalog_invalid(
                    source,
                    format!("demo '{}' has no steps", demo.demo_type),
                ));
            }
            let mut step_ids = HashSet::new();
            for step in &demo.steps {
                if !step_ids.insert(step.id.as_str()) {
                    return Err(CourseError::catalog_invalid(
                        source,
                        format!("duplicate step id '{}' in demo '{}'", step.id, demo.demo_type),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Looks up a demo by type.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::UnknownDemo` if no demo has that type.
    pub fn get(&self, demo_type: &str) -> Result<&DemoDefinition> {
        self.demos
            .iter()
            .find(|d| d.demo_type == demo_type)
            .ok_or_else(|| CourseError::unknown_demo(demo_type))
    }

    /// Iterates demos in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &DemoDefinition> {
        self.demos.iter()
    }

    /// The first demo type in catalog order.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.demos.first().map(|d| d.demo_type.as_str())
    }

    /// The demo after `demo_type`, wrapping to the first after the last.
    ///
    /// An unknown type also yields the first demo.
    #[must_use]
    pub fn next_demo_after(&self, demo_type: &str) -> Option<&str> {
        let position = self.demos.iter().position(|d| d.demo_type == demo_type);
        let next = match position {
            Some(i) if i + 1 < self.demos.len() => i + 1,
            _ => 0,
        };
        self.demos.get(next).map(|d| d.demo_type.as_str())
    }

    /// Number of demos.
    #[must_use]
    pub fn total_demos(&self) -> u32 {
        u32::try_from(self.demos.len()).unwrap_or(u32::MAX)
    }

    /// Listing entries in catalog order.
    #[must_use]
    pub fn summaries(&self) -> Vec<DemoSummary> {
        self.demos
            .iter()
            .map(|d| DemoSummary {
                demo_type: d.demo_type.clone(),
                title: d.title.clone(),
                step_count: d.steps.len(),
                exercise_count: d.steps.iter().filter(|s| s.exercise.is_some()).count(),
            })
            .collect()
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Which transition a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Runs when the step becomes active.
    Enter,
    /// Runs when the step stops being active.
    Exit,
}

#[derive(Clone, Default)]
struct HookPair {
    on_enter: Option<StepHook>,
    on_exit: Option<StepHook>,
}

/// Hooks registered per `(demo_type, step_id)`.
#[derive(Clone, Default)]
pub struct StepHooks {
    entries: HashMap<(String, String), HookPair>,
}

impl StepHooks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook`, replacing any earlier hook of the same kind.
    pub fn register(
        &mut self,
        demo_type: impl Into<String>,
        step_id: impl Into<String>,
        kind: HookKind,
        hook: StepHook,
    ) {
        let pair = self
            .entries
            .entry((demo_type.into(), step_id.into()))
            .or_default();
        match kind {
            HookKind::Enter => pair.on_enter = Some(hook),
            HookKind::Exit => pair.on_exit = Some(hook),
        }
    }

    /// Number of steps with at least one hook.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn attach(&self, demo_type: &str, step: &mut LessonStep) {
        if let Some(pair) = self.entries.get(&(demo_type.to_string(), step.id.clone())) {
            step.on_enter.clone_from(&pair.on_enter);
            step.on_exit.clone_from(&pair.on_exit);
        }
    }
}

impl fmt::Debug for StepHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepHooks")
            .field("steps", &self.entries.len())
            .finish()
    }
}

// ============================================================================
// Demonstration
// ============================================================================

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    /// The active step changed.
    Moved {
        /// Previous index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// The request was out of range and nothing happened.
    Ignored,
    /// Advanced past the last step.
    Completed,
}

impl Transition {
    /// Returns `true` if the active step changed.
    #[must_use]
    pub const fn is_moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

/// Serializable view of a running demonstration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoView {
    /// Demo type tag.
    pub demo_type: String,
    /// Demo title.
    pub title: String,
    /// Active step index.
    pub current_step: usize,
    /// Number of steps.
    pub total_steps: usize,
    /// Active step id.
    pub step_id: String,
    /// Active step title.
    pub step_title: String,
    /// Rounded progress percent.
    pub progress: u32,
    /// Whether the learner advanced past the last step.
    pub completed: bool,
}

/// One running lesson.
#[derive(Debug)]
pub struct Demonstration {
    demo_type: String,
    title: String,
    steps: Vec<LessonStep>,
    current: usize,
    completed: bool,
}

impl Demonstration {
    /// Builds a demonstration at step 0 with `hooks` attached.
    ///
    /// No hook runs until [`Demonstration::enter`].
    ///
    /// # Errors
    ///
    /// Returns `CourseError::CatalogInvalid` if the definition has no steps.
    pub fn new(definition: &DemoDefinition, hooks: &StepHooks) -> Result<Self> {
        if definition.steps.is_empty() {
            return Err(CourseError::catalog_invalid(
                BUILTIN_SOURCE,
                format!("demo '{}' has no steps", definition.demo_type),
            ));
        }

        let mut steps = definition.steps.clone();
        for step in &mut steps {
            hooks.attach(&definition.demo_type, step);
        }

        Ok(Self {
            demo_type: definition.demo_type.clone(),
            title: definition.title.clone(),
            steps,
            current: 0,
            completed: false,
        })
    }

    /// Runs the active step's enter hook.
    pub fn enter(&self) {
        run_hook(self.current_step().on_enter.as_ref());
    }

    /// Runs the active step's exit hook before the demonstration is dropped.
    pub fn teardown(&self) {
        run_hook(self.current_step().on_exit.as_ref());
    }

    /// Demo type tag.
    #[must_use]
    pub fn demo_type(&self) -> &str {
        &self.demo_type
    }

    /// Demo title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// All steps in order.
    #[must_use]
    pub fn steps(&self) -> &[LessonStep] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always `false`; a demonstration has at least one step.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Active step index.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Active step.
    #[must_use]
    pub fn current_step(&self) -> &LessonStep {
        &self.steps[self.current]
    }

    /// Whether the learner advanced past the last step.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Moves to `index`, running exit then enter hooks.
    ///
    /// Out-of-range indices (including negative ones) are ignored. Moving
    /// to the active step is a move onto itself and runs both hooks.
    pub fn go_to_step(&mut self, index: i64) -> Transition {
        let Some(target) = usize::try_from(index).ok().filter(|i| *i < self.steps.len()) else {
            debug!(
                demo_type = %self.demo_type,
                index,
                steps = self.steps.len(),
                "Ignoring out-of-range step"
            );
            return Transition::Ignored;
        };

        let from = self.current;
        run_hook(self.steps[from].on_exit.as_ref());
        self.current = target;
        run_hook(self.steps[target].on_enter.as_ref());

        debug!(demo_type = %self.demo_type, from, to = target, "Step changed");
        Transition::Moved { from, to: target }
    }

    /// Advances one step, or completes the demonstration at the last step.
    ///
    /// Completion can repeat; callers treat it idempotently.
    pub fn next_step(&mut self) -> Transition {
        if self.current + 1 < self.steps.len() {
            return self.go_to_step(index_of(self.current + 1));
        }
        self.completed = true;
        Transition::Completed
    }

    /// Goes back one step; ignored at step 0.
    pub fn previous_step(&mut self) -> Transition {
        if self.current == 0 {
            return Transition::Ignored;
        }
        self.go_to_step(index_of(self.current - 1))
    }

    /// `(current + 1) / len * 100`, rounded.
    #[must_use]
    pub fn progress_percentage(&self) -> u32 {
        let position = (self.current + 1) * 100;
        let len = self.steps.len();
        u32::try_from((position * 2 + len) / (len * 2)).unwrap_or(100)
    }

    /// Serializable view of the current position.
    #[must_use]
    pub fn view(&self) -> DemoView {
        let step = self.current_step();
        DemoView {
            demo_type: self.demo_type.clone(),
            title: self.title.clone(),
            current_step: self.current,
            total_steps: self.steps.len(),
            step_id: step.id.clone(),
            step_title: step.title.clone(),
            progress: self.progress_percentage(),
            completed: self.completed,
        }
    }
}

fn run_hook(hook: Option<&StepHook>) {
    if let Some(hook) = hook {
        hook();
    }
}

fn index_of(i: usize) -> i64 {
    i64::try_from(i).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn six_step_demo() -> DemoDefinition {
        DemoDefinition {
            demo_type: "variables".to_string(),
            title: "Variables".to_string(),
            steps: (0..6)
                .map(|i| LessonStep::new(format!("s{i}"), format!("Step {i}"), ""))
                .collect(),
        }
    }

    fn demonstration() -> Demonstration {
        Demonstration::new(&six_step_demo(), &StepHooks::new()).unwrap()
    }

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "coursekit-catalog-{name}-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    // ------------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------------

    #[test]
    fn test_builtin_catalog_order() {
        let catalog = Catalog::builtin().unwrap();
        let types: Vec<_> = catalog.iter().map(|d| d.demo_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["variables", "functions", "algorithms", "html-css", "git", "web-project"]
        );
        assert_eq!(catalog.total_demos(), 6);
        assert_eq!(catalog.get("variables").unwrap().steps.len(), 6);
        assert_eq!(catalog.get("git").unwrap().steps.len(), 5);
    }

    #[test]
    fn test_builtin_exercises() {
        let catalog = Catalog::builtin().unwrap();
        let git = catalog.get("git").unwrap();
        let exercise = git.steps[1].exercise.as_ref().unwrap();
        assert!(exercise.solution.starts_with("git init\n"));

        let summaries = catalog.summaries();
        assert_eq!(summaries[0].exercise_count, 4);
        assert_eq!(summaries[1].title, "Functions & Control Flow");
    }

    #[test]
    fn test_unknown_demo() {
        let catalog = Catalog::builtin().unwrap();
        let err = catalog.get("quantum").unwrap_err();
        assert_eq!(err.to_string(), "Demo type 'quantum' not found");
    }

    #[test]
    fn test_next_demo_wraps() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.next_demo_after("variables"), Some("functions"));
        assert_eq!(catalog.next_demo_after("web-project"), Some("variables"));
        assert_eq!(catalog.next_demo_after("unknown"), Some("variables"));
    }

    #[test]
    fn test_validation_rejects_duplicates() {
        let json = r#"{"demos":[{"demoType":"a","title":"A","steps":[
            {"id":"x","title":"X","description":""},
            {"id":"x","title":"Y","description":""}]}]}"#;
        let err = Catalog::from_json(json, "dup.json").unwrap_err();
        assert!(err.to_string().contains("duplicate step id 'x'"));

        let json = r#"{"demos":[
            {"demoType":"a","title":"A","steps":[{"id":"x","title":"X","description":""}]},
            {"demoType":"a","title":"B","steps":[{"id":"y","title":"Y","description":""}]}]}"#;
        assert!(Catalog::from_json(json, "dup.json").is_err());
    }

    #[test]
    fn test_validation_rejects_empty() {
        assert!(Catalog::from_json(r#"{"demos":[]}"#, "empty.json").is_err());
        let json = r#"{"demos":[{"demoType":"a","title":"A","steps":[]}]}"#;
        assert!(Catalog::from_json(json, "empty.json").is_err());
    }

    #[test]
    fn test_load_catalog_file() {
        let json = r#"{"demos":[{"demoType":"rust","title":"Rust","steps":[
            {"id":"hello","title":"Hello","description":"fn main"}]}]}"#;
        let path = temp_file("valid", json.as_bytes());

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.first(), Some("rust"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_catalog() {
        let err = Catalog::load("/nonexistent/catalog.json").unwrap_err();
        assert!(
            matches!(&err, CourseError::CatalogNotFound { path } if path.to_string_lossy().contains("catalog.json")),
            "Expected CatalogNotFound, got: {err:?}"
        );
    }

    #[test]
    fn test_load_catalog_too_large() {
        let content = "x".repeat(300 * 1024);
        let path = temp_file("large", content.as_bytes());

        let err = Catalog::load(&path).unwrap_err();
        assert!(
            matches!(&err, CourseError::CatalogTooLarge { size_kb, .. } if *size_kb >= 299),
            "Expected CatalogTooLarge, got: {err:?}"
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_catalog_invalid_encoding() {
        let path = temp_file("utf8", &[0x80, 0x81, 0xFF, 0xFE]);

        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, CourseError::CatalogEncodingError { .. }));

        std::fs::remove_file(&path).ok();
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut demo = demonstration();
        demo.go_to_step(2);

        assert_eq!(demo.go_to_step(-1), Transition::Ignored);
        assert_eq!(demo.go_to_step(999), Transition::Ignored);
        assert_eq!(demo.go_to_step(6), Transition::Ignored);
        assert_eq!(demo.current_index(), 2);
    }

    #[test]
    fn test_index_stays_in_bounds() {
        let mut demo = demonstration();
        let script: [i64; 12] = [3, -4, 9, 5, 0, 1, 7, 2, -1, 5, 4, 100];

        for (round, target) in script.iter().enumerate() {
            match round % 3 {
                0 => {
                    demo.next_step();
                }
                1 => {
                    demo.previous_step();
                }
                _ => {
                    demo.go_to_step(*target);
                }
            }
            assert!(demo.current_index() < demo.len());
        }
    }

    #[test]
    fn test_next_step_completes_at_end() {
        let mut demo = demonstration();
        for expected in 1..6 {
            assert!(demo.next_step().is_moved());
            assert_eq!(demo.current_index(), expected);
        }
        assert_eq!(demo.next_step(), Transition::Completed);
        assert_eq!(demo.next_step(), Transition::Completed);
        assert!(demo.is_completed());
        assert_eq!(demo.current_index(), 5);
    }

    #[test]
    fn test_previous_at_start_is_ignored() {
        let mut demo = demonstration();
        assert_eq!(demo.previous_step(), Transition::Ignored);
        demo.next_step();
        assert_eq!(demo.previous_step(), Transition::Moved { from: 1, to: 0 });
    }

    #[test]
    fn test_progress_percentage() {
        let mut demo = demonstration();
        assert_eq!(demo.progress_percentage(), 17);
        demo.go_to_step(2);
        assert_eq!(demo.progress_percentage(), 50);
        demo.go_to_step(5);
        assert_eq!(demo.progress_percentage(), 100);

        let view = demo.view();
        assert_eq!(view.step_id, "s5");
        assert_eq!(view.total_steps, 6);
    }

    // ------------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------------

    #[test]
    fn test_hooks_run_exit_then_enter() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = StepHooks::new();
        for (step, kind, label) in [
            ("s0", HookKind::Enter, "enter s0"),
            ("s0", HookKind::Exit, "exit s0"),
            ("s1", HookKind::Enter, "enter s1"),
            ("s1", HookKind::Exit, "exit s1"),
        ] {
            let log = log.clone();
            hooks.register(
                "variables",
                step,
                kind,
                Arc::new(move || log.lock().unwrap().push(label)),
            );
        }
        // hooks for another demo never attach
        hooks.register("git", "s0", HookKind::Enter, Arc::new(|| {}));

        let mut demo = Demonstration::new(&six_step_demo(), &hooks).unwrap();
        assert!(log.lock().unwrap().is_empty());

        demo.enter();
        demo.next_step();
        demo.go_to_step(42);
        demo.teardown();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter s0", "exit s0", "enter s1", "exit s1"]
        );
        assert!(!demo.steps()[2].has_enter_hook());
    }

    #[test]
    fn test_steps_serialize_without_hooks() {
        let step = LessonStep::new("intro", "Intro", "Hello");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json, serde_json::json!({"id":"intro","title":"Intro","description":"Hello"}));
    }
}
