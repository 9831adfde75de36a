//! Common error types for Veil.

use thiserror::Error;

/// Result type alias using Veil's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling client configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
}
