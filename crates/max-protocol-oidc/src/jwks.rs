//! JSON Web Key Set (RFC 7517).

use serde::{Deserialize, Serialize};

/// JSON Web Key Set, returned by the JWKS endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Keys in the set.
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// Creates a set from keys.
    #[must_use]
    pub const fn with_keys(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }

    /// Finds a key by its ID.
    #[must_use]
    pub fn find_key(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// An RSA public signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type, `RSA`.
    pub kty: String,
    /// Key ID.
    pub kid: String,
    /// Intended use, `sig`.
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm, `RS256`.
    pub alg: String,
    /// Modulus, base64url.
    pub n: String,
    /// Exponent, base64url.
    pub e: String,
}

impl JsonWebKey {
    /// Builds an RS256 signing key from base64url modulus and exponent.
    #[must_use]
    pub fn rs256(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: kid.into(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            n: n.into(),
            e: e.into(),
        }
    }
}
