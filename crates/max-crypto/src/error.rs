//! Error type for cryptographic operations.

use thiserror::Error;

/// Result alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by signing, key parsing and encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature did not verify.
    #[error("signature verification failed")]
    Verification,

    /// Key material could not be parsed.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Encoded payload was malformed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
