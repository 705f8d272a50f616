//! # max-crypto
//!
//! Cryptographic primitives for the MAX identity gateway, built on aws-lc-rs.
//!
//! - [`random`] - Unguessable tokens and cache keys
//! - [`hash`] - SHA-256 digests and the OIDC `at_hash`
//! - [`keys`] - PEM handling, RSA signing keys and JWK components
//! - [`encrypt`] - AES-256-GCM payload encryption
//!
//! SAML and OIDC interoperability require RSA with SHA-256, so that is the
//! only signature scheme offered.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod encrypt;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;

pub use encrypt::SymmetricEncrypter;
pub use error::{CryptoError, CryptoResult};
pub use hash::{at_hash, sha256, sha256_hex};
pub use keys::{RsaSigner, pem_to_der, verify_rsa_sha256};
pub use random::{gen_token, random_alphanumeric, random_bytes};
