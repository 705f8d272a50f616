//! CLI error types.

use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("validation failed: {0} problem(s) found")]
    Validation(usize),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<max_core::Error> for CliError {
    fn from(err: max_core::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
