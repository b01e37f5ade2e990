//! Error types for Tiki.
//!
//! Library crates use [`TikiError`] via `thiserror`.
//! The CLI wraps this with `color-eyre`; the HTTP server maps each variant
//! onto a status code.

use std::path::PathBuf;

/// Top-level error type for all Tiki operations.
#[derive(Debug, thiserror::Error)]
pub enum TikiError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure that is not tied to a pipeline stage.
    #[error("network error: {0}")]
    Network(String),

    /// Stage 1 failure: the extraction service was unreachable or its
    /// payload could not be parsed.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Stage 2 failure: the enrichment service could not be reached or
    /// answered with an error status.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Rejected input at the boundary (missing file, field or value).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A job or stage output does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A status change that the job state machine does not allow.
    #[error("invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TikiError>;

impl TikiError {
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

    /// Whether this error was raised by one of the two remote stages.
    pub fn is_stage_failure(&self) -> bool {
        matches!(self, Self::Extraction(_) | Self::Enrichment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TikiError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = TikiError::Extraction("connection refused".into());
        assert_eq!(err.to_string(), "extraction error: connection refused");
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = TikiError::InvalidTransition {
            job_id: "abc".into(),
            from: "failed".into(),
            to: "extracting".into(),
        };
        assert!(err.to_string().contains("failed -> extracting"));
    }

    #[test]
    fn stage_failures_are_classified() {
        assert!(TikiError::Enrichment("503".into()).is_stage_failure());
        assert!(!TikiError::validation("no file").is_stage_failure());
    }
}
