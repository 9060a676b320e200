//! Mini code simulator.
//!
//! Turns `(code, language)` into an ordered list of [`OutputEvent`]s without
//! invoking a real interpreter. JavaScript runs on a sandboxed
//! micro-interpreter; Python is simulated by pattern matching.
//!
//! # Example
//!
//! ```
//! use coursekit_core::config::SimulatorConfig;
//! use coursekit_core::simulator::{CodeSimulator, OutputKind};
//!
//! let mut simulator = CodeSimulator::new(&SimulatorConfig::default());
//! let execution = simulator.run("console.log(1 + 1)", Some("js"));
//! assert!(execution.counted);
//! assert_eq!(execution.events[0].kind, OutputKind::Log);
//! assert_eq!(execution.events[0].content, "2");
//! ```

mod javascript;
pub mod python;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::SimulatorConfig;
use crate::error::CourseError;

pub use javascript::{ScriptError, NO_OUTPUT_MESSAGE};

/// Warning emitted for empty or whitespace-only submissions.
pub const EMPTY_CODE_MESSAGE: &str = "No code to execute";

// ============================================================================
// Language
// ============================================================================

/// A language the simulator has a strategy for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    /// Runs on the micro-interpreter.
    #[default]
    JavaScript,
    /// Runs on the pattern matcher.
    Python,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Self; 2] = [Self::JavaScript, Self::Python];

    /// Parses a language tag case-insensitively (`javascript`, `js`, `python`, `py`).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "javascript" | "js" => Some(Self::JavaScript),
            "python" | "py" => Some(Self::Python),
            _ => None,
        }
    }

    /// Infers the language from a file extension.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" => Some(Self::Python),
            _ => None,
        }
    }

    /// Canonical lowercase tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::Python => "Python",
        }
    }

    /// Starter program shown when switching to this language.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::JavaScript => JAVASCRIPT_TEMPLATE,
            Self::Python => PYTHON_TEMPLATE,
        }
    }
}

const JAVASCRIPT_TEMPLATE: &str = r#"// JavaScript Example
console.log("Hello, JavaScript!");

// Variables
let name = "OpenCode";
const version = 1.0;
var isActive = true;

// Function
function greet(user) {
    return `Welcome, ${user}!`;
}

console.log(greet(name));"#;

const PYTHON_TEMPLATE: &str = r#"# Python Example
print("Hello, Python!")

# Variables
name = "OpenCode"
version = 1.0
is_active = True

# Function
def greet(user):
    return f"Welcome, {user}!"

print(greet(name))"#;

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| CourseError::unsupported_language(s))
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_tag(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid language '{s}': expected one of 'javascript', 'python'"
            ))
        })
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Output
// ============================================================================

/// Kind of a simulated console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Log,
    Error,
    Warning,
    Info,
    Success,
}

impl OutputKind {
    /// Lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of simulated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    /// Text of the line.
    pub content: String,
    /// How the line should be presented.
    pub kind: OutputKind,
}

impl OutputEvent {
    /// Creates an event of the given kind.
    pub fn new(kind: OutputKind, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }

    /// A `log` event.
    pub fn log(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Log, content)
    }

    /// An `error` event.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, content)
    }

    /// A `warning` event.
    pub fn warning(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Warning, content)
    }

    /// An `info` event.
    pub fn info(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Info, content)
    }

    /// A `success` event.
    pub fn success(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Success, content)
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// Resource limits for the JavaScript interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorLimits {
    /// Statements, loop iterations and calls allowed per run.
    pub step_budget: u64,
    /// Deepest allowed nesting of function calls.
    pub max_call_depth: u32,
}

impl From<&SimulatorConfig> for SimulatorLimits {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            step_budget: config.step_budget,
            max_call_depth: config.max_call_depth,
        }
    }
}

/// Result of one simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// Output in emission order.
    pub events: Vec<OutputEvent>,
    /// Whether this call incremented the execution counter.
    pub counted: bool,
    /// Counter value after this call.
    pub execution_number: u32,
    /// `true` exactly when this call brought the counter to the milestone.
    pub milestone_reached: bool,
    /// Language the code ran as, when it ran at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl Execution {
    fn rejected(event: OutputEvent, execution_number: u32) -> Self {
        Self {
            events: vec![event],
            counted: false,
            execution_number,
            milestone_reached: false,
            language: None,
        }
    }

    /// Banner line announcing a counted run, e.g. `[Execution #3] Running python code...`.
    #[must_use]
    pub fn header(&self) -> Option<String> {
        let language = self.language.filter(|_| self.counted)?;
        Some(format!(
            "[Execution #{}] Running {language} code...",
            self.execution_number
        ))
    }

    /// Returns `true` if any event is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.events.iter().any(|e| e.kind == OutputKind::Error)
    }
}

/// Runs submissions and counts executions for one session.
#[derive(Debug, Clone)]
pub struct CodeSimulator {
    limits: SimulatorLimits,
    default_language: Language,
    milestone: u32,
    executions: u32,
}

impl CodeSimulator {
    /// Creates a simulator with a zeroed execution counter.
    #[must_use]
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            limits: SimulatorLimits::from(config),
            default_language: config.default_language,
            milestone: config.execution_milestone,
            executions: 0,
        }
    }

    /// Executions counted so far.
    #[must_use]
    pub const fn executions(&self) -> u32 {
        self.executions
    }

    /// Zeroes the execution counter so the milestone can be reached again.
    pub fn reset_counter(&mut self) {
        self.executions = 0;
    }

    /// Counter value that triggers the milestone.
    #[must_use]
    pub const fn milestone(&self) -> u32 {
        self.milestone
    }

    /// Language used when a submission has no tag.
    #[must_use]
    pub const fn default_language(&self) -> Language {
        self.default_language
    }

    /// Runs `code` tagged with `tag`, or the default language when untagged.
    ///
    /// Empty code yields one warning and an unknown tag one error; neither is
    /// counted. Every other call is counted once, whatever the code does.
    pub fn run(&mut self, code: &str, tag: Option<&str>) -> Execution {
        if code.trim().is_empty() {
            return Execution::rejected(OutputEvent::warning(EMPTY_CODE_MESSAGE), self.executions);
        }
        let language = match tag {
            None => self.default_language,
            Some(tag) => match Language::from_tag(tag) {
                Some(language) => language,
                None => {
                    tracing::debug!(tag, "Unsupported language requested");
                    return Execution::rejected(
                        OutputEvent::error(CourseError::unsupported_language(tag).to_string()),
                        self.executions,
                    );
                }
            },
        };
        self.run_language(code, language)
    }

    /// Runs `code` as `language`.
    pub fn run_language(&mut self, code: &str, language: Language) -> Execution {
        if code.trim().is_empty() {
            return Execution::rejected(OutputEvent::warning(EMPTY_CODE_MESSAGE), self.executions);
        }
        self.executions = self.executions.saturating_add(1);
        let events = self.evaluate(code, language);
        let milestone_reached = self.executions == self.milestone;
        tracing::debug!(
            language = %language,
            execution = self.executions,
            events = events.len(),
            milestone_reached,
            "Simulated code"
        );
        Execution {
            events,
            counted: true,
            execution_number: self.executions,
            milestone_reached,
            language: Some(language),
        }
    }

    /// Produces output for `code` without touching the counter.
    #[must_use]
    pub fn evaluate(&self, code: &str, language: Language) -> Vec<OutputEvent> {
        match language {
            Language::JavaScript => javascript::run(code, self.limits),
            Language::Python => python::run(code),
        }
    }

    /// Checks `code` for syntax problems without running it.
    pub fn validate(&self, code: &str, language: Language) -> Result<(), String> {
        match language {
            Language::JavaScript => javascript::check_syntax(code).map_err(|e| e.to_string()),
            Language::Python => python::validate(code),
        }
    }
}
