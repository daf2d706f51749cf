//! Error types for StudyQA.
//!
//! Library crates use [`StudyQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for StudyQA library operations.
#[derive(Debug, thiserror::Error)]
pub enum StudyQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP client construction error.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad question set, out-of-range count, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StudyQaError>;

impl StudyQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a not-found error for a record kind and id.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = StudyQaError::config("endpoint is not a valid URL");
        assert_eq!(err.to_string(), "config error: endpoint is not a valid URL");

        let err = StudyQaError::validation("num_questions 21 out of range");
        assert!(err.to_string().contains("num_questions 21"));

        let err = StudyQaError::not_found("paragraph", "abc");
        assert_eq!(err.to_string(), "paragraph not found: abc");
    }
}
