//! HTTP-Redirect and HTTP-POST bindings for outgoing `AuthnRequest`s.

use std::io::{Read, Write};

use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::constants::RSA_SHA256;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;

/// HTTP-Redirect binding: deflated, base64 and url-encoded query parameters.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Builds the redirect URL carrying `xml` as `SAMLRequest`.
    ///
    /// With a signer, `SigAlg` and `Signature` are appended and the
    /// signature covers the query exactly as sent.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let mut query = format!(
            "SAMLRequest={}",
            urlencoding::encode(&STANDARD.encode(compressed))
        );

        if let Some(relay_state) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(relay_state)));
        }

        if let Some(signer) = signer {
            query.push_str(&format!("&SigAlg={}", urlencoding::encode(RSA_SHA256)));
            let signature = signer.sign_redirect_query(&query)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a `SAMLRequest` value that has already been url-decoded.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base64, deflate data or UTF-8.
    pub fn decode(saml_request: &str) -> SamlResult<String> {
        let compressed = STANDARD.decode(saml_request.trim())?;
        let xml = deflate_decompress(&compressed)?;
        String::from_utf8(xml).map_err(|e| SamlError::Deflate(format!("invalid UTF-8: {e}")))
    }
}

/// HTTP-POST binding: the request is base64 encoded into an auto-submit form.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64 value of the `SAMLRequest` form field.
    #[must_use]
    pub fn encode(xml: &str) -> String {
        STANDARD.encode(xml)
    }

    /// Decodes a posted `SAMLRequest` or `SAMLResponse` field.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base64 or UTF-8.
    pub fn decode(value: &str) -> SamlResult<String> {
        let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(cleaned)?;
        String::from_utf8(bytes).map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))
    }
}

fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(e.to_string()))?;
    encoder.finish().map_err(|e| SamlError::Deflate(e.to_string()))
}

fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(e.to_string()))?;
    Ok(decompressed)
}
