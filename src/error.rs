//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while layering configuration sources
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] ::config::ConfigError),

    /// A limit that cannot be enforced, such as a zero window
    #[error("Invalid rate limit: {0}")]
    InvalidLimit(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
