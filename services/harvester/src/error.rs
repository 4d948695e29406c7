//! Service-specific error types

use graph_client::ApiError;
use thiserror::Error;

/// Harvester command errors.
///
/// Per-call API failures reach the commands as envelopes; they only become
/// an `Error` when a command cannot continue without the call's payload.
#[derive(Error, Debug)]
pub enum Error {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account {0} has no access token")]
    MissingToken(String),

    #[error("{0} collection needs a query or an id")]
    MissingTarget(&'static str),

    #[error("no {0} matched")]
    NothingFound(&'static str),

    #[error("API call failed: {0}")]
    Api(ApiError),

    #[error(transparent)]
    Store(#[from] store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
