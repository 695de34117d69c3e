//! Error types for reportflow.
//!
//! Library crates use [`ReportFlowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Maximum number of characters kept when quoting offending generated text.
pub const PREVIEW_CHARS: usize = 200;

/// Top-level error type for all reportflow operations.
#[derive(Debug, thiserror::Error)]
pub enum ReportFlowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A unit's prepare phase found a required upstream compartment absent or empty.
    #[error("missing dependency: `{compartment}` is not available ({hint})")]
    MissingDependency { compartment: String, hint: String },

    /// Transport or server failure while calling the text-generation client.
    #[error("generation error: {0}")]
    Generation(String),

    /// An execute attempt exceeded its deadline.
    #[error("timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// Generated text did not have the expected structured shape.
    #[error("malformed response: {message} (got: {preview})")]
    MalformedResponse { message: String, preview: String },

    /// A file or directory does not exist.
    #[error("not found: {path:?}")]
    NotFound { path: PathBuf },

    /// A path that must be a directory is not one.
    #[error("not a directory: {path:?}")]
    NotADirectory { path: PathBuf },

    /// A materials directory holds nothing ingestible.
    #[error("no supported files found in {path:?}")]
    NoSupportedFiles { path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Structured-text (JSON/YAML/TOML) encoding or decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad graph wiring, unsupported format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Document-to-markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReportFlowError>;

impl ReportFlowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Report that `compartment` must be written before this unit runs.
    pub fn missing(compartment: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingDependency {
            compartment: compartment.into(),
            hint: hint.into(),
        }
    }

    /// Create a malformed-response error quoting a truncated preview of `text`.
    pub fn malformed(msg: impl Into<String>, text: &str) -> Self {
        Self::MalformedResponse {
            message: msg.into(),
            preview: preview(text, PREVIEW_CHARS),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether an execute-phase failure of this kind may succeed on another attempt.
    ///
    /// Malformed structured output counts as retryable: the same prompt is
    /// re-submitted and the model gets another chance to produce the shape.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::Timeout { .. } | Self::MalformedResponse { .. }
        )
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
