//! XML signature creation.
//!
//! Requests are generated in exclusive canonical form (sorted attributes,
//! expanded empty elements, namespaces declared where first used), so the
//! digest is taken over the element text as written.

use base64::{Engine, engine::general_purpose::STANDARD};
use max_crypto::RsaSigner;

use crate::constants::{ENVELOPED_SIGNATURE, EXC_C14N, RSA_SHA256, SHA256_DIGEST, XMLDSIG_NS};
use crate::error::{SamlError, SamlResult};

/// Signs SAML documents and redirect binding queries with the SP key.
pub struct XmlSigner {
    key: RsaSigner,
    certificate: Option<String>,
}

impl std::fmt::Debug for XmlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSigner")
            .field("key", &"[REDACTED]")
            .field("has_certificate", &self.certificate.is_some())
            .finish()
    }
}

impl XmlSigner {
    /// Creates a signer from a PEM private key and optional PEM certificate.
    ///
    /// The certificate is embedded as `ds:X509Certificate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA key.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key = RsaSigner::from_pem(private_key_pem)?;
        let certificate = certificate_pem
            .map(max_crypto::keys::pem_body)
            .filter(|body| !body.is_empty());
        Ok(Self { key, certificate })
    }

    /// DER public key of the signing key.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key.public_key_der()
    }

    /// Inserts an enveloped `ds:Signature` into the element with `ID="{reference_id}"`.
    ///
    /// The signature goes directly after the element's `Issuer`, or first
    /// inside the element when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is missing or signing fails.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let bounds = find_element(xml, reference_id)?;
        let digest = STANDARD.encode(max_crypto::sha256(&xml.as_bytes()[bounds.start..bounds.end]));

        let signed_info = build_signed_info(reference_id, &digest);
        let signature_value = STANDARD.encode(self.key.sign_sha256(signed_info.as_bytes())?);

        let signature = self.build_signature_element(&signed_info, &signature_value);
        let position = find_issuer_end(&xml[..bounds.end], bounds.open_tag_end)
            .unwrap_or(bounds.open_tag_end);

        Ok(format!("{}{signature}{}", &xml[..position], &xml[position..]))
    }

    /// Signs the query string of an HTTP-Redirect binding message.
    ///
    /// `signed_query` is `SAMLRequest=..&RelayState=..&SigAlg=..` exactly as
    /// it appears in the URL. Returns the base64 signature.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_redirect_query(&self, signed_query: &str) -> SamlResult<String> {
        let signature = self
            .key
            .sign_sha256(signed_query.as_bytes())
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))?;
        Ok(STANDARD.encode(signature))
    }

    fn build_signature_element(&self, signed_info: &str, signature_value: &str) -> String {
        let key_info = self
            .certificate
            .as_ref()
            .map(|certificate| {
                format!(
                    "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{certificate}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>"
                )
            })
            .unwrap_or_default();

        format!(
            r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info}<ds:SignatureValue>{signature_value}</ds:SignatureValue>{key_info}</ds:Signature>"#
        )
    }
}

struct ElementBounds {
    start: usize,
    open_tag_end: usize,
    end: usize,
}

/// Locates the element carrying `ID="{reference_id}"`.
fn find_element(xml: &str, reference_id: &str) -> SamlResult<ElementBounds> {
    let id_attribute = xml
        .find(&format!("ID=\"{reference_id}\""))
        .ok_or_else(|| {
            SamlError::SignatureCreation(format!("Element with ID '{reference_id}' not found"))
        })?;

    let start = xml[..id_attribute]
        .rfind('<')
        .ok_or_else(|| SamlError::SignatureCreation("Malformed XML element".to_string()))?;
    let open_tag_end = xml[id_attribute..]
        .find('>')
        .map(|pos| id_attribute + pos + 1)
        .ok_or_else(|| SamlError::SignatureCreation("Malformed XML element".to_string()))?;

    let tag_name = xml[start + 1..]
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or_default();
    let close_tag = format!("</{tag_name}>");
    let end = xml[open_tag_end..]
        .find(&close_tag)
        .map(|pos| open_tag_end + pos + close_tag.len())
        .ok_or_else(|| {
            SamlError::SignatureCreation(format!("Unclosed XML element '{tag_name}'"))
        })?;

    Ok(ElementBounds {
        start,
        open_tag_end,
        end,
    })
}

/// Position right after the first `Issuer` element following `after`.
fn find_issuer_end(xml: &str, after: usize) -> Option<usize> {
    let search_area = &xml[after..];
    let rest = search_area.trim_start();
    if !(rest.starts_with("<saml:Issuer") || rest.starts_with("<saml2:Issuer")) {
        return None;
    }
    ["</saml:Issuer>", "</saml2:Issuer>"]
        .iter()
        .find_map(|pattern| search_area.find(pattern).map(|pos| after + pos + pattern.len()))
}

fn build_signed_info(reference_id: &str, digest: &str) -> String {
    format!(
        concat!(
            r#"<ds:SignedInfo xmlns:ds="{ns}">"#,
            r#"<ds:CanonicalizationMethod Algorithm="{c14n}"></ds:CanonicalizationMethod>"#,
            r#"<ds:SignatureMethod Algorithm="{rsa}"></ds:SignatureMethod>"#,
            r##"<ds:Reference URI="#{id}">"##,
            r#"<ds:Transforms>"#,
            r#"<ds:Transform Algorithm="{enveloped}"></ds:Transform>"#,
            r#"<ds:Transform Algorithm="{c14n}"></ds:Transform>"#,
            r#"</ds:Transforms>"#,
            r#"<ds:DigestMethod Algorithm="{sha256}"></ds:DigestMethod>"#,
            r#"<ds:DigestValue>{digest}</ds:DigestValue>"#,
            r#"</ds:Reference>"#,
            r#"</ds:SignedInfo>"#,
        ),
        ns = XMLDSIG_NS,
        c14n = EXC_C14N,
        rsa = RSA_SHA256,
        id = reference_id,
        enveloped = ENVELOPED_SIGNATURE,
        sha256 = SHA256_DIGEST,
        digest = digest,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: &str = include_str!("../../../testdata/sp.key");
    const CERT: &str = include_str!("../../../testdata/sp.crt");

    const DOCUMENT: &str = concat!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_abc" Version="2.0">"#,
        r#"<saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">https://sp</saml:Issuer>"#,
        r#"<samlp:NameIDPolicy></samlp:NameIDPolicy>"#,
        r#"</samlp:AuthnRequest>"#
    );

    fn signer() -> XmlSigner {
        XmlSigner::from_pem(KEY, Some(CERT)).unwrap()
    }

    fn between<'a>(xml: &'a str, open: &str, close: &str) -> &'a str {
        let start = xml.find(open).unwrap() + open.len();
        let end = xml[start..].find(close).unwrap() + start;
        &xml[start..end]
    }

    #[test]
    fn signature_follows_issuer() {
        let signed = signer().sign(DOCUMENT, "_abc").unwrap();
        let issuer_end = signed.find("</saml:Issuer>").unwrap() + "</saml:Issuer>".len();
        assert!(signed[issuer_end..].starts_with("<ds:Signature"));
        assert!(signed.contains("<ds:X509Certificate>"));
        assert!(signed.contains(r##"URI="#_abc""##));
    }

    #[test]
    fn digest_and_signature_verify() {
        let signer = signer();
        let signed = signer.sign(DOCUMENT, "_abc").unwrap();

        let digest = between(&signed, "<ds:DigestValue>", "</ds:DigestValue>");
        assert_eq!(
            STANDARD.decode(digest).unwrap(),
            max_crypto::sha256(DOCUMENT.as_bytes())
        );

        let signed_info_start = signed.find("<ds:SignedInfo").unwrap();
        let signed_info_end = signed.find("</ds:SignedInfo>").unwrap() + "</ds:SignedInfo>".len();
        let signature = STANDARD
            .decode(between(&signed, "<ds:SignatureValue>", "</ds:SignatureValue>"))
            .unwrap();
        assert!(max_crypto::verify_rsa_sha256(
            &signer.public_key_der(),
            signed[signed_info_start..signed_info_end].as_bytes(),
            &signature
        ));
    }

    #[test]
    fn signs_without_issuer_at_element_start() {
        let xml = r#"<samlp:ArtifactResolve ID="_x"><samlp:Artifact>AAQ</samlp:Artifact></samlp:ArtifactResolve>"#;
        let signed = signer().sign(xml, "_x").unwrap();
        assert!(signed.starts_with(r#"<samlp:ArtifactResolve ID="_x"><ds:Signature"#));
    }

    #[test]
    fn missing_reference_is_an_error() {
        assert!(signer().sign(DOCUMENT, "_nope").is_err());
    }

    #[test]
    fn redirect_query_signature_verifies() {
        let signer = signer();
        let query = "SAMLRequest=abc&RelayState=xyz&SigAlg=rsa";
        let signature = STANDARD
            .decode(signer.sign_redirect_query(query).unwrap())
            .unwrap();
        assert!(max_crypto::verify_rsa_sha256(
            &signer.public_key_der(),
            query.as_bytes(),
            &signature
        ));
    }
}
