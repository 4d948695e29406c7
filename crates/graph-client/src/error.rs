//! Error types for constructing the request core
//!
//! Only construction can fail. Once built, the executor reports per-call
//! failures through `ResponseEnvelope` instead.

/// Errors raised while building limiters, executors and transports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Result alias for construction-time operations.
pub type Result<T> = std::result::Result<T, Error>;
