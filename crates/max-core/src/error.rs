//! Error handling for the MAX gateway core.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for configuration and bootstrap operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured log level is not recognised.
    #[error("Invalid loglevel {0}")]
    InvalidLogLevel(String),

    /// The mock DigiD flow was enabled in a production environment.
    #[error("Unable to enable mock_digid for environment {0}")]
    MockDigidInProduction(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path of the offending file.
        path: String,
        /// Parser message.
        message: String,
    },

    /// I/O error while reading configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns whether the error was caused by invalid operator input.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidLogLevel(_)
                | Self::MockDigidInProduction(_)
                | Self::Parse { .. }
        )
    }
}
