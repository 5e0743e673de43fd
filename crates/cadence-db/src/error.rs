//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`fred`] and [`serde_json`] errors with context about which operation
//! failed. The store adapters convert it into the error types the game loop
//! expects.

use cadence_core::interfaces::{StateError, StoreError};

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key was not found in `Dragonfly`.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored value is not in the expected format.
    #[error("Corrupt value at {key}: {reason}")]
    Corrupt {
        /// The offending key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Serialization(source) => Self::Serialization { source },
            other => Self::Backend {
                message: other.to_string(),
            },
        }
    }
}

impl From<DbError> for StateError {
    fn from(err: DbError) -> Self {
        Self::Unavailable {
            reason: err.to_string(),
        }
    }
}
