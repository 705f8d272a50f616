//! RSA key handling.
//!
//! Keys are read from PEM files. Private keys may be PKCS#8 (`PRIVATE KEY`)
//! or PKCS#1 (`RSA PRIVATE KEY`); public keys may be `SubjectPublicKeyInfo`
//! or a bare `RSAPublicKey`.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

use crate::error::{CryptoError, CryptoResult};

/// XML-DSig URI of RSA-SHA256.
pub const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// Returns the base64 body of a PEM document without armor or line breaks.
#[must_use]
pub fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

/// Decodes the first PEM block in `pem` to DER.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the body is not valid base64 or empty.
pub fn pem_to_der(pem: &str) -> CryptoResult<Vec<u8>> {
    let body = pem_body(first_block(pem));
    if body.is_empty() {
        return Err(CryptoError::InvalidKey("empty PEM document".to_string()));
    }
    STANDARD
        .decode(body)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid PEM body: {e}")))
}

fn first_block(pem: &str) -> &str {
    match pem.find("-----END") {
        Some(end) => pem[end..]
            .find('\n')
            .map_or(pem, |nl| &pem[..end + nl]),
        None => pem,
    }
}

/// RSA private key producing RSASSA-PKCS1-v1_5 SHA-256 signatures.
pub struct RsaSigner {
    key_pair: RsaKeyPair,
    key_id: String,
}

impl std::fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RsaSigner {
    /// Parses a PEM encoded private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA key.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        Self::from_der(&pem_to_der(pem)?)
    }

    /// Parses a PKCS#8 or PKCS#1 DER private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA key.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_pkcs8(der)
            .or_else(|_| RsaKeyPair::from_der(der))
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA key: {e}")))?;
        let key_id = generate_key_id(key_pair.public_key().as_ref());
        Ok(Self { key_pair, key_id })
    }

    /// Overrides the generated key id.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Key id derived from the public key, or the one set with [`RsaSigner::with_key_id`].
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// DER `RSAPublicKey` of this key.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Signs `data` with RSA PKCS#1 v1.5 and SHA-256.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_sha256(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(&signature::RSA_PKCS1_SHA256, &rng, data, &mut sig)
            .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;
        Ok(sig)
    }

    /// Public key as an RS256 JWK.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key cannot be decoded.
    pub fn public_jwk(&self) -> CryptoResult<serde_json::Value> {
        let (n, e) = rsa_public_components(self.key_pair.public_key().as_ref())?;
        Ok(serde_json::json!({
            "kty": "RSA",
            "kid": self.key_id,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(&n),
            "e": URL_SAFE_NO_PAD.encode(&e),
        }))
    }
}

/// Verifies an RSA PKCS#1 v1.5 SHA-256 signature.
///
/// `public_key_der` is a DER `RSAPublicKey` or `SubjectPublicKeyInfo`.
#[must_use]
pub fn verify_rsa_sha256(public_key_der: &[u8], data: &[u8], sig: &[u8]) -> bool {
    let rsa_public_key = match spki_inner_key(public_key_der) {
        Ok(Some(inner)) => inner,
        Ok(None) => public_key_der,
        Err(_) => return false,
    };
    UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, rsa_public_key)
        .verify(data, sig)
        .is_ok()
}

fn generate_key_id(public_key: &[u8]) -> String {
    let hash = crate::sha256(public_key);
    URL_SAFE_NO_PAD.encode(&hash[..8])
}

/// Extracts the RSA modulus `n` and exponent `e` as unsigned big-endian bytes.
///
/// Accepts a DER `SubjectPublicKeyInfo` or a bare `RSAPublicKey`.
///
/// # Errors
///
/// Returns an error when the structure is not an RSA public key.
pub fn rsa_public_components(der: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let key = spki_inner_key(der)?.unwrap_or(der);

    let mut pos = expect_tag(key, 0, 0x30, "RSAPublicKey SEQUENCE")?;
    let (n, next) = read_integer(key, pos)?;
    pos = next;
    let (e, _) = read_integer(key, pos)?;
    Ok((n, e))
}

/// Returns the `RSAPublicKey` wrapped by a `SubjectPublicKeyInfo`, or `None`
/// when `der` is not an SPKI.
fn spki_inner_key(der: &[u8]) -> CryptoResult<Option<&[u8]>> {
    let mut pos = expect_tag(der, 0, 0x30, "SEQUENCE")?;
    if der.get(pos) != Some(&0x30) {
        return Ok(None);
    }

    // algorithm identifier
    pos += 1;
    let alg_len = read_length(der, pos)?;
    pos = skip_length(der, pos)? + alg_len;

    pos = expect_tag(der, pos, 0x03, "BIT STRING")?;
    // unused bits
    pos += 1;
    der.get(pos..)
        .map(Some)
        .ok_or_else(|| CryptoError::InvalidKey("truncated SubjectPublicKeyInfo".to_string()))
}

fn expect_tag(data: &[u8], pos: usize, tag: u8, what: &str) -> CryptoResult<usize> {
    if data.get(pos) != Some(&tag) {
        return Err(CryptoError::InvalidKey(format!("expected {what}")));
    }
    skip_length(data, pos + 1)
}

fn read_integer(data: &[u8], pos: usize) -> CryptoResult<(Vec<u8>, usize)> {
    if data.get(pos) != Some(&0x02) {
        return Err(CryptoError::InvalidKey("expected INTEGER".to_string()));
    }
    let len = read_length(data, pos + 1)?;
    let start = skip_length(data, pos + 1)?;
    let bytes = data
        .get(start..start + len)
        .ok_or_else(|| CryptoError::InvalidKey("truncated INTEGER".to_string()))?;
    // strip ASN.1 sign padding
    let value = match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest.to_vec(),
        _ => bytes.to_vec(),
    };
    Ok((value, start + len))
}

fn read_length(data: &[u8], pos: usize) -> CryptoResult<usize> {
    let first = *data
        .get(pos)
        .ok_or_else(|| CryptoError::InvalidKey("Unexpected end of data".to_string()))?;

    if first < 0x80 {
        return Ok(usize::from(first));
    }
    let num_bytes = usize::from(first & 0x7F);
    if num_bytes > 4 {
        return Err(CryptoError::InvalidKey("Length too large".to_string()));
    }
    let mut len = 0usize;
    for i in 0..num_bytes {
        let byte = *data
            .get(pos + 1 + i)
            .ok_or_else(|| CryptoError::InvalidKey("Unexpected end of length".to_string()))?;
        len = (len << 8) | usize::from(byte);
    }
    Ok(len)
}

fn skip_length(data: &[u8], pos: usize) -> CryptoResult<usize> {
    let first = *data
        .get(pos)
        .ok_or_else(|| CryptoError::InvalidKey("Unexpected end of data".to_string()))?;

    if first < 0x80 {
        Ok(pos + 1)
    } else {
        Ok(pos + 1 + usize::from(first & 0x7F))
    }
}
