//! Error types for store operations

/// Errors from loading or persisting record files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("record parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
