//! RS256 token signing.
//!
//! One key signs id tokens and userinfo responses. The public half is
//! derived from the private key and published through the JWKS endpoint.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{OidcError, OidcResult};
use crate::jwks::{JsonWebKey, JsonWebKeySet};

/// Claims of an id token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,
    /// Pairwise subject.
    pub sub: String,
    /// Client id.
    pub aud: String,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Nonce from the authorize request.
    pub nonce: String,
    /// Left half hash of the access token.
    pub at_hash: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Opaque access token for the userinfo endpoint.
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Signed id token.
    pub id_token: String,
}

/// Signs and verifies RS256 JWTs for one issuer.
pub struct TokenSigner {
    kid: String,
    issuer: String,
    lifetime: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwk: JsonWebKey,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("kid", &self.kid)
            .field("issuer", &self.issuer)
            .field("lifetime", &self.lifetime)
            .field("encoding_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Creates a signer from a PEM private key (PKCS#8 or PKCS#1).
    ///
    /// Without an explicit `kid` one is derived from the public key.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::TokenSigning`] if the key cannot be parsed.
    pub fn new(
        private_key_pem: &str,
        issuer: impl Into<String>,
        lifetime: Duration,
        kid: Option<String>,
    ) -> OidcResult<Self> {
        let rsa = max_crypto::RsaSigner::from_pem(private_key_pem)
            .map_err(|e| OidcError::TokenSigning(e.to_string()))?;
        let kid = kid.unwrap_or_else(|| rsa.key_id().to_string());

        let (n, e) = max_crypto::keys::rsa_public_components(&rsa.public_key_der())
            .map_err(|e| OidcError::TokenSigning(e.to_string()))?;
        let n = URL_SAFE_NO_PAD.encode(n);
        let e = URL_SAFE_NO_PAD.encode(e);

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| OidcError::TokenSigning(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| OidcError::TokenValidation(e.to_string()))?;

        Ok(Self {
            jwk: JsonWebKey::rs256(kid.clone(), n, e),
            kid,
            issuer: issuer.into(),
            lifetime,
            encoding_key,
            decoding_key,
        })
    }

    /// Issuer placed in every token.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Token lifetime.
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Signs arbitrary claims.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::TokenSigning`] if encoding fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> OidcResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header.typ = Some("JWT".to_string());

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| OidcError::TokenSigning(e.to_string()))
    }

    /// Creates an id token bound to `access_token` through `at_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn create_id_token(
        &self,
        sub: &str,
        client_id: &str,
        nonce: &str,
        access_token: &str,
    ) -> OidcResult<String> {
        let claims = self.id_token_claims(sub, client_id, nonce, access_token);
        self.sign(&claims)
    }

    fn id_token_claims(
        &self,
        sub: &str,
        client_id: &str,
        nonce: &str,
        access_token: &str,
    ) -> IdTokenClaims {
        let (iat, exp) = self.validity();
        IdTokenClaims {
            iss: self.issuer.clone(),
            sub: sub.to_string(),
            aud: client_id.to_string(),
            exp,
            iat,
            nonce: nonce.to_string(),
            at_hash: max_crypto::at_hash(access_token),
        }
    }

    /// `(iat, exp)` for a token issued now.
    #[must_use]
    pub fn validity(&self) -> (i64, i64) {
        let iat = Utc::now().timestamp();
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        (iat, iat.saturating_add(lifetime))
    }

    /// Verifies signature, issuer and expiry and decodes the claims.
    ///
    /// The audience is not checked; callers compare it to the client.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::TokenValidation`] for any invalid token.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> OidcResult<T> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| OidcError::TokenValidation(e.to_string()))
    }

    /// The published key set.
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet::with_keys(vec![self.jwk.clone()])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &str = include_str!("../../../testdata/oidc.key");

    fn signer() -> TokenSigner {
        TokenSigner::new(
            PRIVATE_KEY,
            "https://localhost:8006",
            Duration::from_secs(600),
            Some("test-key".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn id_token_round_trip() {
        let signer = signer();
        let token = signer
            .create_id_token("subject", "test_client", "n-0S6_WzA2Mj", "access")
            .unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("test-key"));
        assert_eq!(header.alg, Algorithm::RS256);

        let claims: IdTokenClaims = signer.verify(&token).unwrap();
        assert_eq!(claims.iss, "https://localhost:8006");
        assert_eq!(claims.aud, "test_client");
        assert_eq!(claims.nonce, "n-0S6_WzA2Mj");
        assert_eq!(claims.at_hash, max_crypto::at_hash("access"));
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn rejects_foreign_issuer() {
        let signer = signer();
        let other = TokenSigner::new(
            PRIVATE_KEY,
            "https://elsewhere",
            Duration::from_secs(600),
            None,
        )
        .unwrap();
        let token = other.create_id_token("s", "c", "n", "a").unwrap();
        assert!(signer.verify::<IdTokenClaims>(&token).is_err());
    }

    #[test]
    fn rejects_tampered_token() {
        let signer = signer();
        let token = signer.create_id_token("s", "c", "n", "a").unwrap();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"iss":"https://localhost:8006","sub":"x"}"#);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged;
        let err = signer.verify::<IdTokenClaims>(&parts.join(".")).unwrap_err();
        assert_eq!(err.error_code(), "invalid_token");
    }

    #[test]
    fn jwks_publishes_kid() {
        let jwks = signer().jwks();
        let key = jwks.find_key("test-key").unwrap();
        assert_eq!(key.alg, "RS256");
        assert_eq!(key.e, "AQAB");
    }

    #[test]
    fn derives_kid_without_config() {
        let signer = TokenSigner::new(PRIVATE_KEY, "iss", Duration::from_secs(1), None).unwrap();
        assert!(!signer.jwks().keys[0].kid.is_empty());
    }

    #[test]
    fn rejects_invalid_key() {
        assert!(TokenSigner::new("garbage", "iss", Duration::from_secs(1), None).is_err());
    }
}
