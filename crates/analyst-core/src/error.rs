//! Error types for the analyst core

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by configuration loading and payload decoding.
///
/// Transcript parsing never fails: malformed lines are dropped, not reported.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration file error: {0}")]
    ConfigFile(String),

    #[error("Image payload is not valid base64: {0}")]
    ImagePayload(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::ConfigFile(err.to_string())
    }
}
