//! Cryptographically secure random generation.
//!
//! Used for authorization codes, access tokens, cache keys and SAML request
//! identifiers.

use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};

/// Length of tokens produced by [`gen_token`].
pub const TOKEN_LENGTH: usize = 32;

/// Generates `len` random bytes from the thread-local CSPRNG.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random string of `len` alphanumeric characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates an unguessable token suitable as a cache key.
///
/// 32 alphanumeric characters, roughly 190 bits of entropy.
#[must_use]
pub fn gen_token() -> String {
    random_alphanumeric(TOKEN_LENGTH)
}

/// Generates a SAML request identifier.
///
/// XML IDs may not start with a digit, hence the leading underscore.
#[must_use]
pub fn saml_id() -> String {
    let bytes = random_bytes(20);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("_{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_token_is_alphanumeric() {
        let token = gen_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(gen_token(), gen_token());
    }

    #[test]
    fn saml_id_starts_with_underscore() {
        let id = saml_id();
        assert!(id.starts_with('_'));
        assert_eq!(id.len(), 41);
    }
}
