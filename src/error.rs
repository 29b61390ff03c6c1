//! Error types for the Pacer library.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Pacer operations.
#[derive(Error, Debug)]
pub enum PacerError {
    /// The throttle interval must be a positive duration
    #[error("invalid throttle interval: {interval:?}")]
    InvalidInterval { interval: Duration },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker task failed, e.g. because the wrapped action panicked
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Result type alias for Pacer operations.
pub type Result<T> = std::result::Result<T, PacerError>;
