//! Error types for airwave-bitstream.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing elementary streams and containers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bitstream is structurally invalid or truncated.
    #[error("malformed bitstream: {0}")]
    Malformed(String),
}

impl Error {
    /// Create a malformed-bitstream error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}
