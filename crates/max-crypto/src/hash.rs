//! Hash functions.

use aws_lc_rs::digest;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Computes the SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Computes the SHA-256 digest of `data` as lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    sha256(data).iter().map(|b| format!("{b:02x}")).collect()
}

/// Computes the OIDC `at_hash` claim for an access token.
///
/// The left-most half of the SHA-256 digest, base64url encoded without
/// padding (OpenID Connect Core 3.1.3.6).
#[must_use]
pub fn at_hash(access_token: &str) -> String {
    let digest = sha256(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn at_hash_uses_left_half() {
        let hash = at_hash("token");
        // 16 bytes -> 22 base64url characters
        assert_eq!(hash.len(), 22);
        assert_eq!(
            URL_SAFE_NO_PAD.decode(&hash).unwrap_or_default(),
            sha256(b"token")[..16].to_vec()
        );
    }
}
