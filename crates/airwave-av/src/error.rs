//! Error types for airwave-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while producing or probing chunks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source media file does not exist.
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The external transcoder failed (nonzero exit, spawn failure, timeout).
    #[error("transcode failed: {tool}: {message}")]
    TranscodeFailed { tool: String, message: String },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    ParseError { tool: String, message: String },

    /// The transcoder produced empty or structurally invalid output.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The produced video lacks a keyframe even after a repair pass.
    #[error("missing keyframe in {}", path.display())]
    MissingKeyframe { path: PathBuf },

    /// The achieved duration is non-positive or wildly off the request.
    #[error("invalid duration: {0}")]
    InvalidDuration(f64),

    /// Elementary-stream parsing failed.
    #[error(transparent)]
    Bitstream(#[from] airwave_bitstream::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a source-not-found error.
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a transcode-failed error.
    pub fn transcode_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TranscodeFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
