//! Proof Key for Code Exchange (RFC 7636).
//!
//! Only the `S256` method is accepted; `plain` offers no protection for
//! public clients.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::error::{OidcError, OidcResult};

/// The only supported challenge method.
pub const S256: &str = "S256";

/// PKCE verification.
pub struct PkceVerifier;

impl PkceVerifier {
    /// Verifies `code_verifier` against the stored S256 `code_challenge`.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::InvalidGrant`] when the verifier is malformed or
    /// does not hash to the challenge.
    pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> OidcResult<()> {
        if !(43..=128).contains(&code_verifier.len()) {
            return Err(OidcError::InvalidGrant(
                "code_verifier must be between 43 and 128 characters".to_string(),
            ));
        }

        if !code_verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(OidcError::InvalidGrant(
                "code_verifier contains invalid characters".to_string(),
            ));
        }

        if Self::challenge(code_verifier) != code_challenge {
            return Err(OidcError::InvalidGrant("PKCE verification failed".to_string()));
        }
        Ok(())
    }

    /// Computes the S256 challenge for a verifier.
    #[must_use]
    pub fn challenge(code_verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(max_crypto::sha256(code_verifier.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFIER: &str = "SoOEDN-mZKNhw7Mc52VXxyiqTvFB3mod36MwPru253c";
    const CHALLENGE: &str = "_1f8tFjAtu6D1Df-GOyDPoMjCJdEvaSWsnqR6SLpzsw";

    #[test]
    fn accepts_matching_verifier() {
        assert_eq!(PkceVerifier::challenge(VERIFIER), CHALLENGE);
        assert!(PkceVerifier::verify_s256(VERIFIER, CHALLENGE).is_ok());
    }

    #[test]
    fn rejects_wrong_verifier() {
        let other = "a".repeat(43);
        assert!(PkceVerifier::verify_s256(&other, CHALLENGE).is_err());
    }

    #[test]
    fn rejects_short_or_invalid_verifiers() {
        assert!(PkceVerifier::verify_s256("short", CHALLENGE).is_err());
        let long = "a".repeat(129);
        assert!(PkceVerifier::verify_s256(&long, CHALLENGE).is_err());
        let invalid = format!("{}+", "a".repeat(42));
        assert!(PkceVerifier::verify_s256(&invalid, CHALLENGE).is_err());
    }
}
