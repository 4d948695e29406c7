//! Common error types

use thiserror::Error;

/// Configuration and file-loading errors shared across the workspace.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing secret: {0}")]
    MissingSecret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = Error::Config("max_calls must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "configuration error: max_calls must be greater than 0"
        );
    }

    #[test]
    fn missing_secret_names_the_source() {
        let err = Error::MissingSecret("set GRAPH_APP_SECRET or api.app_secret_file".into());
        assert!(err.to_string().contains("GRAPH_APP_SECRET"), "got: {err}");
    }

    #[test]
    fn io_error_converts() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
        assert!(format!("{err:?}").contains("Io"));
    }
}
