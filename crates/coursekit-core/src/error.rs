//! Error types for coursekit.
//!
//! This module defines the error hierarchy for every core operation:
//! configuration loading, catalog parsing, lesson navigation, progress
//! persistence and the code simulator boundary.
//!
//! Errors raised by learner-submitted code never appear here. They are
//! captured by the simulator and turned into output events.

use std::path::PathBuf;

/// A specialized `Result` type for coursekit operations.
pub type Result<T> = std::result::Result<T, CourseError>;

/// Errors that can occur while running a course session.
///
/// Variants are organized by subsystem and carry actionable suggestions
/// where the learner or operator can fix the problem.
#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your coursekit.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Catalog Errors
    // ========================================================================
    /// Catalog file was not found at the specified path.
    #[error("Catalog not found: '{path}'\n\nSuggestion: Check the 'catalog' field in coursekit.json or remove it to use the built-in lessons")]
    CatalogNotFound {
        /// Path where the catalog was expected.
        path: PathBuf,
    },

    /// Catalog file exceeds the size limit.
    #[error("Catalog exceeds size limit (256KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the course into several catalogs")]
    CatalogTooLarge {
        /// Path to the oversized catalog.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Catalog file contains non-UTF-8 content.
    #[error("Catalog has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    CatalogEncodingError {
        /// Path to the catalog with encoding issues.
        path: PathBuf,
    },

    /// Catalog content is structurally invalid.
    #[error("Invalid catalog '{path}': {message}")]
    CatalogInvalid {
        /// Path to the catalog, or `<built-in>` for the embedded one.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    // ========================================================================
    // Lesson Errors
    // ========================================================================
    /// No demonstration with this type exists in the catalog.
    #[error("Demo type '{demo_type}' not found")]
    UnknownDemo {
        /// The requested demo type.
        demo_type: String,
    },

    // ========================================================================
    // Simulator Errors
    // ========================================================================
    /// No execution strategy is registered for the language tag.
    #[error("Language '{language}' not supported")]
    UnsupportedLanguage {
        /// The requested language tag.
        language: String,
    },

    // ========================================================================
    // Progress Errors
    // ========================================================================
    /// The achievement id is not part of the achievement book.
    #[error("Unknown achievement: '{id}'")]
    UnknownAchievement {
        /// The requested achievement id.
        id: String,
    },

    /// Stored progress could not be parsed.
    #[error("Malformed progress data under key '{key}': {message}\n\nSuggestion: Run 'coursekit reset' to start fresh, or import a backup")]
    MalformedPersistedState {
        /// Storage key that held the payload.
        key: String,
        /// Description of the parse failure.
        message: String,
    },

    /// An import payload was produced by an unsupported export version.
    #[error("Unsupported export version '{found}' (expected '{expected}')\n\nSuggestion: Re-export the progress with a current coursekit")]
    ImportVersionMismatch {
        /// Version found in the payload.
        found: String,
        /// Version this build understands.
        expected: String,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// A key-value store operation failed.
    #[error("Storage error for key '{key}': {message}")]
    StorageError {
        /// The key being read or written.
        key: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourseError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `CatalogNotFound` error.
    #[must_use]
    pub fn catalog_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CatalogNotFound { path: path.into() }
    }

    /// Creates a new `CatalogTooLarge` error.
    #[must_use]
    pub fn catalog_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::CatalogTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `CatalogEncodingError`.
    #[must_use]
    pub fn catalog_encoding(path: impl Into<PathBuf>) -> Self {
        Self::CatalogEncodingError { path: path.into() }
    }

    /// Creates a new `CatalogInvalid` error.
    #[must_use]
    pub fn catalog_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CatalogInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnknownDemo` error.
    #[must_use]
    pub fn unknown_demo(demo_type: impl Into<String>) -> Self {
        Self::UnknownDemo {
            demo_type: demo_type.into(),
        }
    }

    /// Creates a new `UnsupportedLanguage` error.
    #[must_use]
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage {
            language: language.into(),
        }
    }

    /// Creates a new `UnknownAchievement` error.
    #[must_use]
    pub fn unknown_achievement(id: impl Into<String>) -> Self {
        Self::UnknownAchievement { id: id.into() }
    }

    /// Creates a new `MalformedPersistedState` error.
    #[must_use]
    pub fn malformed_state(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPersistedState {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ImportVersionMismatch` error.
    #[must_use]
    pub fn import_version(found: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::ImportVersionMismatch {
            found: found.into(),
            expected: expected.into(),
        }
    }

    /// Creates a new `StorageError`.
    #[must_use]
    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageError {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the session can continue after this error.
    ///
    /// Recoverable errors are reported to the caller but leave the session
    /// state untouched (or, for malformed progress, reset to defaults).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownDemo { .. }
                | Self::UnsupportedLanguage { .. }
                | Self::UnknownAchievement { .. }
                | Self::MalformedPersistedState { .. }
                | Self::ImportVersionMismatch { .. }
                | Self::StorageError { .. }
        )
    }

    /// Returns `true` if this error prevents a session from starting.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::CatalogNotFound { .. }
                | Self::CatalogTooLarge { .. }
                | Self::CatalogEncodingError { .. }
                | Self::CatalogInvalid { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = CourseError::catalog_not_found("/path/to/catalog.json");
        let msg = err.to_string();
        assert!(msg.contains("Catalog not found"));
        assert!(msg.contains("/path/to/catalog.json"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_unknown_demo_message() {
        let err = CourseError::unknown_demo("quantum");
        assert_eq!(err.to_string(), "Demo type 'quantum' not found");
    }

    #[test]
    fn test_unsupported_language_message() {
        let err = CourseError::unsupported_language("cobol");
        assert_eq!(err.to_string(), "Language 'cobol' not supported");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(CourseError::malformed_state("course-progress", "eof").is_recoverable());
        assert!(CourseError::unknown_achievement("nope").is_recoverable());
        assert!(!CourseError::catalog_not_found("x.json").is_recoverable());
    }

    #[test]
    fn test_is_fatal() {
        assert!(CourseError::config_parse("coursekit.json", "bad").is_fatal());
        assert!(CourseError::catalog_invalid("<built-in>", "empty").is_fatal());
        assert!(!CourseError::unknown_demo("x").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CourseError = io_err.into();
        assert!(matches!(err, CourseError::Io(_)));
    }

    #[test]
    fn test_catalog_too_large_display() {
        let err = CourseError::catalog_too_large("/big/catalog.json", 300);
        let msg = err.to_string();
        assert!(msg.contains("300KB"));
        assert!(msg.contains("256KB"));
    }

    #[test]
    fn test_import_version_display() {
        let err = CourseError::import_version("2.0", "1.0");
        assert!(err.to_string().contains("'2.0'"));
    }
}
