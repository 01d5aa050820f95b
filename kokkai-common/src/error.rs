//! Common error types for Kokkai

use thiserror::Error;

/// Common result type for Kokkai operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by everything that touches the proceedings database or
/// reads deployment configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration file
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A secret (API key, database URL) was not provided by any source
    #[error("Secret '{0}' not found in /run/secrets or environment")]
    MissingSecret(String),
}
