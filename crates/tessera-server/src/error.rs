//! Error types for server bootstrap
//!
//! Per-operation failures stay [`KmsError`]s and travel inside the response.
//! [`ServerError`] covers what can go wrong before a batch is processed.

use thiserror::Error;

use tessera_core::KmsError;
use tessera_logging::LoggingError;
use tessera_storage::StorageError;

/// Errors raised while configuring or starting the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// Batch file could not be parsed
    #[error("Batch error: {0}")]
    Batch(#[from] serde_json::Error),

    /// Engine error outside a batch item
    #[error(transparent)]
    Kms(#[from] KmsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ServerError {
    fn from(e: toml::de::Error) -> Self {
        ServerError::Config(e.to_string())
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
