//! Configuration types for coursekit.
//!
//! This module provides the configuration structures that control where
//! progress is stored, which lesson catalog is served, how much work the
//! code simulator may do per submission, and how achievements are scored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CourseError, Result};
use crate::simulator::Language;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "coursekit.json";

/// Default directory for persisted progress.
fn default_storage_dir() -> String {
    ".coursekit".to_string()
}

/// Default key under which progress is stored.
fn default_storage_key() -> String {
    "course-progress".to_string()
}

/// Default execution count that unlocks the code-runner milestone.
const fn default_execution_milestone() -> u32 {
    10
}

/// Default number of interpreter steps allowed per submission.
const fn default_step_budget() -> u64 {
    100_000
}

/// Default maximum call depth for interpreted functions.
const fn default_max_call_depth() -> u32 {
    64
}

/// Default time window for the speed-learner achievement.
const fn default_speed_learner_minutes() -> u32 {
    30
}

/// Main configuration for a course session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory that holds persisted progress files.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Key under which the progress record is stored.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Optional path to a lesson catalog; the built-in one is used when absent.
    #[serde(default)]
    pub catalog: Option<String>,

    /// Code simulator tuning.
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Achievement scoring.
    #[serde(default)]
    pub achievements: AchievementConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            storage_key: default_storage_key(),
            catalog: None,
            simulator: SimulatorConfig::default(),
            achievements: AchievementConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `coursekit.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            CourseError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `coursekit.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the (validated) default configuration.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ConfigParseError` if the file cannot be read or
    /// contains invalid JSON, and `CourseError::ConfigValidationError` if a
    /// value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(CourseError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CourseError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the storage directory as a path.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_dir)
    }

    /// Validates the configuration values.
    ///
    /// - `storageDir` and `storageKey` must not be empty
    /// - `storageKey` may only contain ASCII letters, digits, `-` and `_`
    /// - every simulator limit and the speed-learner window must be positive
    ///
    /// # Errors
    ///
    /// Returns `CourseError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.storage_dir.trim().is_empty() {
            return Err(CourseError::config_validation(
                "storageDir must not be empty",
                "Provide a directory for progress files in your coursekit.json (use '.' for the current directory)",
            ));
        }

        if self.storage_key.is_empty() || !is_valid_storage_key(&self.storage_key) {
            return Err(CourseError::config_validation(
                format!("storageKey '{}' is not a valid key", self.storage_key),
                "Use only letters, digits, '-' and '_' for storageKey",
            ));
        }

        if self.simulator.execution_milestone == 0 {
            return Err(CourseError::config_validation(
                "simulator.executionMilestone must be greater than 0",
                "Set simulator.executionMilestone to at least 1 in your coursekit.json",
            ));
        }

        if self.simulator.step_budget == 0 {
            return Err(CourseError::config_validation(
                "simulator.stepBudget must be greater than 0",
                "Set simulator.stepBudget to a positive number of steps",
            ));
        }

        if self.simulator.max_call_depth == 0 {
            return Err(CourseError::config_validation(
                "simulator.maxCallDepth must be greater than 0",
                "Set simulator.maxCallDepth to at least 1 in your coursekit.json",
            ));
        }

        if self.achievements.speed_learner_minutes == 0 {
            return Err(CourseError::config_validation(
                "achievements.speedLearnerMinutes must be greater than 0",
                "Set achievements.speedLearnerMinutes to at least 1 minute",
            ));
        }

        Ok(())
    }
}

/// Returns `true` if `key` is safe to use as a storage key (and file stem).
#[must_use]
pub fn is_valid_storage_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Code simulator limits and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorConfig {
    /// Language used when a submission carries no tag.
    #[serde(default)]
    pub default_language: Language,

    /// Execution count that triggers the code-runner milestone.
    #[serde(default = "default_execution_milestone")]
    pub execution_milestone: u32,

    /// Maximum interpreter steps per JavaScript submission.
    #[serde(default = "default_step_budget")]
    pub step_budget: u64,

    /// Maximum nested function calls per JavaScript submission.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_language: Language::default(),
            execution_milestone: default_execution_milestone(),
            step_budget: default_step_budget(),
            max_call_depth: default_max_call_depth(),
        }
    }
}

/// Achievement scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementConfig {
    /// A demo finished within this many minutes of being loaded earns speed-learner.
    #[serde(default = "default_speed_learner_minutes")]
    pub speed_learner_minutes: u32,

    /// Bonus skill points granted for each newly completed demo.
    #[serde(default)]
    pub demo_completion_points: u32,
}

impl Default for AchievementConfig {
    fn default() -> Self {
        Self {
            speed_learner_minutes: default_speed_learner_minutes(),
            demo_completion_points: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Creates a unique scratch directory for file-based tests.
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "coursekit-config-{name}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.storage_dir, ".coursekit");
        assert_eq!(config.storage_key, "course-progress");
        assert!(config.catalog.is_none());
        assert_eq!(config.simulator.default_language, Language::JavaScript);
        assert_eq!(config.simulator.execution_milestone, 10);
        assert_eq!(config.simulator.step_budget, 100_000);
        assert_eq!(config.simulator.max_call_depth, 64);
        assert_eq!(config.achievements.speed_learner_minutes, 30);
        assert_eq!(config.achievements.demo_completion_points, 0);
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.storage_key, "course-progress");
        assert_eq!(config.simulator.execution_milestone, 10);
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "storageDir": "/tmp/progress",
            "catalog": "lessons.json",
            "simulator": {
                "defaultLanguage": "PYTHON",
                "stepBudget": 500
            },
            "achievements": { "demoCompletionPoints": 10 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.storage_dir, "/tmp/progress");
        assert_eq!(config.catalog.as_deref(), Some("lessons.json"));
        assert_eq!(config.simulator.default_language, Language::Python);
        assert_eq!(config.simulator.step_budget, 500);
        assert_eq!(config.simulator.max_call_depth, 64);
        assert_eq!(config.achievements.demo_completion_points, 10);
        assert_eq!(config.achievements.speed_learner_minutes, 30);
    }

    #[test]
    fn test_invalid_language_is_rejected() {
        let json = r#"{ "simulator": { "defaultLanguage": "ruby" } }"#;
        let err = serde_json::from_str::<Config>(json).unwrap_err();
        assert!(err.to_string().contains("ruby"));
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_validate_default_passes() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_milestone() {
        let mut config = Config::default();
        config.simulator.execution_milestone = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("executionMilestone"));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.simulator.step_budget = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_storage_key() {
        let mut config = Config::default();
        config.storage_key = "../escape".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CourseError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_storage_dir() {
        let mut config = Config::default();
        config.storage_dir = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_key_rules() {
        assert!(is_valid_storage_key("course-progress"));
        assert!(is_valid_storage_key("learner_01"));
        assert!(!is_valid_storage_key(""));
        assert!(!is_valid_storage_key("a/b"));
        assert!(!is_valid_storage_key("a.b"));
    }

    // ------------------------------------------------------------------------
    // File loading
    // ------------------------------------------------------------------------

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = scratch_dir("missing");
        let config = Config::load_from_dir(&dir).unwrap();
        assert_eq!(config.storage_dir, ".coursekit");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = scratch_dir("invalid");
        std::fs::write(dir.join(CONFIG_FILE_NAME), "{ not json").unwrap();

        let err = Config::load_from_dir(&dir).unwrap_err();
        assert!(matches!(err, CourseError::ConfigParseError { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_values_are_validated() {
        let dir = scratch_dir("validated");
        std::fs::write(
            dir.join(CONFIG_FILE_NAME),
            r#"{ "simulator": { "maxCallDepth": 0 } }"#,
        )
        .unwrap();

        let err = Config::load_from_dir(&dir).unwrap_err();
        assert!(matches!(err, CourseError::ConfigValidationError { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }
}
