//! Symmetric payload encryption.
//!
//! Payloads are sealed with AES-256-GCM under a random 96-bit nonce. The
//! output is the base64 encoding of `{"payload": "<b64>", "nonce": "<b64>"}`
//! so it can be stored in the cache or passed through a form field.

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::random::random_bytes;

/// Encrypted payload and its nonce, both base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Ciphertext with the authentication tag appended.
    pub payload: String,
    /// Nonce used for sealing.
    pub nonce: String,
}

/// AES-256-GCM sealing with a fixed key.
pub struct SymmetricEncrypter {
    key: LessSafeKey,
}

impl std::fmt::Debug for SymmetricEncrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricEncrypter { .. }")
    }
}

impl SymmetricEncrypter {
    /// Creates an encrypter from a 64 character hex key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not 32 bytes of hex.
    pub fn from_hex(key_hex: &str) -> CryptoResult<Self> {
        Self::new(&decode_hex(key_hex.trim())?)
    }

    /// Creates an encrypter from 32 raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key length is wrong.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CryptoError::InvalidKey(format!("expected 32 byte key, got {}", key.len())))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    /// Seals `plaintext` and returns the encoded envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let nonce_bytes = random_bytes(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| CryptoError::Encryption("invalid nonce".to_string()))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encryption("seal failed".to_string()))?;

        let envelope = EncryptedPayload {
            payload: STANDARD.encode(&in_out),
            nonce: STANDARD.encode(&nonce_bytes),
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Opens an envelope produced by [`SymmetricEncrypter::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error for malformed envelopes or when authentication fails.
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<Vec<u8>> {
        let json = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidPayload(e.to_string()))?;
        let envelope: EncryptedPayload =
            serde_json::from_slice(&json).map_err(|e| CryptoError::InvalidPayload(e.to_string()))?;
        self.open(&envelope)
    }

    /// Opens a decoded envelope.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed fields or when authentication fails.
    pub fn open(&self, envelope: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
        let nonce_bytes = STANDARD
            .decode(&envelope.nonce)
            .map_err(|e| CryptoError::InvalidPayload(e.to_string()))?;
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| CryptoError::InvalidPayload("nonce must be 12 bytes".to_string()))?;
        let mut in_out = STANDARD
            .decode(&envelope.payload)
            .map_err(|e| CryptoError::InvalidPayload(e.to_string()))?;

        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encryption("authentication failed".to_string()))?;
        Ok(plaintext.to_vec())
    }
}

fn decode_hex(hex: &str) -> CryptoResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(CryptoError::InvalidKey("odd length hex key".to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CryptoError::InvalidKey("key is not hex".to_string()))
        })
        .collect()
}
