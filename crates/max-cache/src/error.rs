//! Cache error types.

use std::fmt;

/// Cache operation errors.
#[derive(Debug)]
pub enum CacheError {
    /// Connection to cache backend failed.
    Connection(String),
    /// Serialization/deserialization error.
    Serialization(String),
    /// Stored value has an unexpected type.
    InvalidValue(String),
    /// Invalid cache configuration.
    Configuration(String),
    /// Internal cache error.
    Internal(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "cache connection error: {msg}"),
            Self::Serialization(msg) => write!(f, "cache serialization error: {msg}"),
            Self::InvalidValue(msg) => write!(f, "unexpected cache value: {msg}"),
            Self::Configuration(msg) => write!(f, "cache configuration error: {msg}"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CacheError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "cache connection error: refused");

        let err = CacheError::InvalidValue("ipv4:1.2.3.4".to_string());
        assert!(err.to_string().contains("ipv4:1.2.3.4"));
    }
}
