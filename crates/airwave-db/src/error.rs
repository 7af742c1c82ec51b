//! Error types for airwave-db.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(String),

    /// A requested row does not exist.
    #[error("not found: {entity} '{key}'")]
    NotFound { entity: &'static str, key: String },
}

impl Error {
    /// Create a database error from any displayable source.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}
