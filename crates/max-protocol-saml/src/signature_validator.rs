//! XML signature validation.
//!
//! Verifies enveloped RSA-SHA256 signatures on identity provider messages.
//! The referenced element and its `SignedInfo` are rewritten in exclusive
//! canonical form (without comments) before digesting and verifying, so
//! whitespace and namespace placement chosen by the identity provider do
//! not matter.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::STANDARD};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::constants::{ENVELOPED_SIGNATURE, EXC_C14N, RSA_SHA256, SHA256_DIGEST, XMLDSIG_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::{self, XmlNode, escape_attr, escape_text};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// XML signature validator.
///
/// Trusts the public keys of the identity provider's signing certificates.
#[derive(Debug, Clone, Default)]
pub struct XmlSignatureValidator {
    /// DER `SubjectPublicKeyInfo` of each trusted certificate.
    trusted_keys: Vec<Vec<u8>>,
}

impl XmlSignatureValidator {
    /// Creates a validator from base64 DER certificates as found in metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a certificate cannot be decoded.
    pub fn from_base64_certificates<S: AsRef<str>>(certificates: &[S]) -> SamlResult<Self> {
        let trusted_keys = certificates
            .iter()
            .map(|certificate| {
                let der = STANDARD.decode(certificate.as_ref())?;
                public_key_from_certificate(&der)
            })
            .collect::<SamlResult<Vec<_>>>()?;
        Ok(Self { trusted_keys })
    }

    /// Number of trusted keys.
    #[must_use]
    pub fn trusted_key_count(&self) -> usize {
        self.trusted_keys.len()
    }

    /// Validates the signatures of an `ArtifactResponse`, bare or inside a
    /// SOAP envelope.
    ///
    /// At least one of `ArtifactResponse`, `Response` or `Assertion` must be
    /// signed, and every signature present must be valid.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] when no element is signed or a
    /// signature does not verify.
    pub fn validate_artifact_response(&self, document: &str) -> SamlResult<()> {
        let root = xml::parse(document)?;
        let artifact_response = if root.name == "ArtifactResponse" {
            &root
        } else {
            root.find("ArtifactResponse")
                .ok_or_else(|| SamlError::MissingElement("ArtifactResponse".to_string()))?
        };
        let response = artifact_response.child("Response");
        let assertion = response.and_then(|response| response.child("Assertion"));

        let signed: Vec<&XmlNode> = [Some(artifact_response), response, assertion]
            .into_iter()
            .flatten()
            .filter(|element| element.child("Signature").is_some())
            .collect();
        if signed.is_empty() {
            return Err(SamlError::SignatureInvalid(
                "artifact response is not signed".to_string(),
            ));
        }

        for element in signed {
            let id = element.attr("ID").ok_or_else(|| {
                SamlError::SignatureInvalid(format!("signed {} has no ID", element.name))
            })?;
            self.validate(document, id)?;
        }
        Ok(())
    }

    /// Validates the enveloped signature of the element with `ID="{reference_id}"`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the element is unsigned, uses
    /// an unsupported algorithm, or its digest or signature does not match.
    pub fn validate(&self, document: &str, reference_id: &str) -> SamlResult<()> {
        let document = document.replace("\r\n", "\n");
        let root = xml::parse(&document)?;
        let element = find_by_id(&root, reference_id).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("element '{reference_id}' not found"))
        })?;
        let signature = extract_signature(element, reference_id)?;

        let canonical = canonicalize(
            &document,
            &Target::Element(reference_id),
            &signature.reference_prefixes,
        )?;
        let digest = STANDARD.encode(max_crypto::sha256(canonical.as_bytes()));
        if digest != signature.digest_value {
            return Err(SamlError::SignatureInvalid("digest value mismatch".to_string()));
        }

        let signed_info = canonicalize(
            &document,
            &Target::SignedInfo(reference_id),
            &signature.signed_info_prefixes,
        )?;
        let signature_value = STANDARD
            .decode(&signature.signature_value)
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid signature encoding: {e}")))?;

        if self
            .trusted_keys
            .iter()
            .any(|key| max_crypto::verify_rsa_sha256(key, signed_info.as_bytes(), &signature_value))
        {
            Ok(())
        } else {
            Err(SamlError::SignatureInvalid(
                "signature does not match a trusted certificate".to_string(),
            ))
        }
    }
}

/// What the signature says about its reference.
struct XmlSignature {
    digest_value: String,
    signature_value: String,
    reference_prefixes: Vec<String>,
    signed_info_prefixes: Vec<String>,
}

fn extract_signature(element: &XmlNode, reference_id: &str) -> SamlResult<XmlSignature> {
    let missing = |name: &str| SamlError::SignatureInvalid(format!("missing {name}"));

    let signature = element.child("Signature").ok_or_else(|| {
        SamlError::SignatureInvalid(format!("element '{reference_id}' is not signed"))
    })?;
    let signed_info = signature.child("SignedInfo").ok_or_else(|| missing("SignedInfo"))?;

    let canonicalization = signed_info.child("CanonicalizationMethod");
    if algorithm(canonicalization) != Some(EXC_C14N) {
        return Err(SamlError::SignatureInvalid(
            "unsupported canonicalization method".to_string(),
        ));
    }
    if algorithm(signed_info.child("SignatureMethod")) != Some(RSA_SHA256) {
        return Err(SamlError::SignatureInvalid("unsupported signature method".to_string()));
    }

    let reference = signed_info.child("Reference").ok_or_else(|| missing("Reference"))?;
    if reference.attr("URI") != Some(format!("#{reference_id}").as_str()) {
        return Err(SamlError::SignatureInvalid(
            "signature does not reference the signed element".to_string(),
        ));
    }
    if algorithm(reference.child("DigestMethod")) != Some(SHA256_DIGEST) {
        return Err(SamlError::SignatureInvalid("unsupported digest method".to_string()));
    }

    let mut reference_prefixes = Vec::new();
    let transforms = reference
        .child("Transforms")
        .map(|transforms| transforms.children.as_slice())
        .unwrap_or_default();
    for transform in transforms {
        match transform.attr("Algorithm") {
            Some(ENVELOPED_SIGNATURE) => {}
            Some(EXC_C14N) => reference_prefixes = inclusive_prefixes(transform),
            other => {
                return Err(SamlError::SignatureInvalid(format!(
                    "unsupported transform {other:?}"
                )));
            }
        }
    }

    let base64_text = |node: Option<&XmlNode>, name: &str| {
        node.map(|node| node.text.split_whitespace().collect::<String>())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| missing(name))
    };

    Ok(XmlSignature {
        digest_value: base64_text(reference.child("DigestValue"), "DigestValue")?,
        signature_value: base64_text(signature.child("SignatureValue"), "SignatureValue")?,
        reference_prefixes,
        signed_info_prefixes: canonicalization.map(inclusive_prefixes).unwrap_or_default(),
    })
}

fn algorithm(node: Option<&XmlNode>) -> Option<&str> {
    node.and_then(|node| node.attr("Algorithm"))
}

/// `PrefixList` of an `InclusiveNamespaces` child; `#default` is the empty prefix.
fn inclusive_prefixes(method: &XmlNode) -> Vec<String> {
    method
        .child("InclusiveNamespaces")
        .and_then(|inclusive| inclusive.attr("PrefixList"))
        .map(|list| {
            list.split_whitespace()
                .map(|prefix| if prefix == "#default" { "" } else { prefix }.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn find_by_id<'a>(node: &'a XmlNode, id: &str) -> Option<&'a XmlNode> {
    if node.attr("ID") == Some(id) {
        return Some(node);
    }
    node.children.iter().find_map(|child| find_by_id(child, id))
}

fn public_key_from_certificate(der: &[u8]) -> SamlResult<Vec<u8>> {
    let (_, certificate) = X509Certificate::from_der(der)
        .map_err(|e| SamlError::Crypto(format!("invalid certificate: {e}")))?;
    Ok(certificate.public_key().raw.to_vec())
}

/// Subtree to canonicalize.
enum Target<'a> {
    /// The element with this `ID`, minus its enveloped signature.
    Element(&'a str),
    /// `SignedInfo` of the signature enveloped in the element with this `ID`.
    SignedInfo(&'a str),
}

/// A start tag with its namespace declarations split off.
struct StartTag {
    name: String,
    prefix: String,
    local_name: String,
    id: Option<String>,
    declarations: Vec<(String, String)>,
    attributes: Vec<(String, String, String)>,
}

impl StartTag {
    fn read(start: &BytesStart<'_>) -> SamlResult<Self> {
        let lossy = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
        let name = start.name();
        let mut tag = Self {
            name: lossy(name.as_ref()),
            prefix: name.prefix().map(|p| lossy(p.as_ref())).unwrap_or_default(),
            local_name: lossy(name.local_name().as_ref()),
            id: None,
            declarations: Vec::new(),
            attributes: Vec::new(),
        };
        for attribute in start.attributes() {
            let attribute = attribute?;
            let value = attribute.unescape_value()?.into_owned();
            if let Some(binding) = attribute.key.as_namespace_binding() {
                let prefix = match binding {
                    quick_xml::name::PrefixDeclaration::Default => String::new(),
                    quick_xml::name::PrefixDeclaration::Named(prefix) => lossy(prefix),
                };
                tag.declarations.push((prefix, value));
                continue;
            }
            let key = attribute.key;
            if key.as_ref() == b"ID" {
                tag.id = Some(value.clone());
            }
            tag.attributes.push((
                key.prefix().map(|p| lossy(p.as_ref())).unwrap_or_default(),
                lossy(key.as_ref()),
                value,
            ));
        }
        Ok(tag)
    }
}

/// Progress through the document.
#[derive(Default)]
struct Canonicalizer {
    /// Declarations of every open element, outermost first.
    scopes: Vec<Vec<(String, String)>>,
    /// Local name and `ID` of every open element.
    path: Vec<(String, Option<String>)>,
    /// Depth of the captured element once found.
    capture_depth: Option<usize>,
    /// Depth of an excluded subtree being skipped.
    skip_depth: Option<usize>,
    /// Declarations written by each open output element.
    rendered: Vec<Vec<(String, String)>>,
    output: String,
}

impl Canonicalizer {
    fn in_scope(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flatten()
            .find(|(declared, _)| declared == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn last_rendered(&self, prefix: &str) -> Option<&str> {
        self.rendered
            .iter()
            .rev()
            .flatten()
            .find(|(declared, _)| declared == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn namespace_of(&self, prefix: &str) -> String {
        match prefix {
            "" => String::new(),
            "xml" => XML_NS.to_string(),
            _ => self.in_scope(prefix).unwrap_or_default().to_string(),
        }
    }

    fn matches(&self, target: &Target<'_>, tag: &StartTag) -> bool {
        match target {
            Target::Element(id) => tag.id.as_deref() == Some(*id),
            Target::SignedInfo(id) => {
                let depth = self.path.len();
                tag.local_name == "SignedInfo"
                    && depth >= 3
                    && self.path[depth - 2].0 == "Signature"
                    && self.path[depth - 3].1.as_deref() == Some(*id)
            }
        }
    }

    /// Enveloped signature of the captured element.
    fn is_enveloped_signature(&self, target: &Target<'_>, tag: &StartTag) -> bool {
        matches!(target, Target::Element(_))
            && self.capture_depth.is_some_and(|depth| self.path.len() == depth + 1)
            && tag.local_name == "Signature"
            && self.namespace_of(&tag.prefix) == XMLDSIG_NS
    }

    fn write_start(&mut self, tag: &StartTag, inclusive: &[String]) {
        let mut utilized: BTreeSet<&str> = BTreeSet::new();
        utilized.insert(&tag.prefix);
        for (prefix, _, _) in &tag.attributes {
            if !prefix.is_empty() && prefix != "xml" {
                utilized.insert(prefix);
            }
        }
        for prefix in inclusive {
            if self.in_scope(prefix).is_some() {
                utilized.insert(prefix);
            }
        }

        let mut declarations = Vec::new();
        for prefix in utilized {
            let uri = self.in_scope(prefix).unwrap_or_default();
            let rendered = self.last_rendered(prefix);
            let needed = if uri.is_empty() {
                prefix.is_empty() && rendered.is_some_and(|r| !r.is_empty())
            } else {
                rendered != Some(uri)
            };
            if needed {
                declarations.push((prefix.to_string(), uri.to_string()));
            }
        }

        let mut attributes: Vec<(String, &str, &str, &str)> = tag
            .attributes
            .iter()
            .map(|(prefix, name, value)| {
                let local = name.rsplit(':').next().unwrap_or(name);
                (self.namespace_of(prefix), local, name.as_str(), value.as_str())
            })
            .collect();
        attributes.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        self.output.push('<');
        self.output.push_str(&tag.name);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                self.output.push_str(&format!(r#" xmlns="{}""#, escape_attr(uri)));
            } else {
                self.output
                    .push_str(&format!(r#" xmlns:{prefix}="{}""#, escape_attr(uri)));
            }
        }
        for (_, _, name, value) in &attributes {
            self.output.push_str(&format!(r#" {name}="{}""#, escape_attr(value)));
        }
        self.output.push('>');
        self.rendered.push(declarations);
    }

    fn write_end(&mut self, name: &str) {
        self.output.push_str("</");
        self.output.push_str(name);
        self.output.push('>');
        self.rendered.pop();
    }

    fn writing(&self) -> bool {
        self.capture_depth.is_some() && self.skip_depth.is_none()
    }

    fn open(&mut self, target: &Target<'_>, tag: &StartTag, inclusive: &[String]) {
        self.scopes.push(tag.declarations.clone());
        self.path.push((tag.local_name.clone(), tag.id.clone()));

        if self.capture_depth.is_none() {
            if self.matches(target, tag) {
                self.capture_depth = Some(self.path.len());
                self.write_start(tag, inclusive);
            }
        } else if self.skip_depth.is_none() {
            if self.is_enveloped_signature(target, tag) {
                self.skip_depth = Some(self.path.len());
            } else {
                self.write_start(tag, inclusive);
            }
        }
    }

    /// Closes the innermost element; true once the captured element is closed.
    fn close(&mut self, name: &str) -> bool {
        if self.writing() {
            self.write_end(name);
        }
        self.scopes.pop();
        self.path.pop();
        let depth = self.path.len();
        if self.skip_depth.is_some_and(|skip| depth < skip) {
            self.skip_depth = None;
        }
        self.capture_depth.is_some_and(|capture| depth < capture)
    }

    fn text(&mut self, text: &str) {
        if self.writing() {
            self.output.push_str(&escape_text(text).replace('\r', "&#xD;"));
        }
    }
}

/// Exclusive canonical form of `target`, without comments.
fn canonicalize(document: &str, target: &Target<'_>, inclusive: &[String]) -> SamlResult<String> {
    let mut reader = Reader::from_str(document);
    let mut state = Canonicalizer::default();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let tag = StartTag::read(&start)?;
                state.open(target, &tag, inclusive);
            }
            Event::Empty(start) => {
                let tag = StartTag::read(&start)?;
                state.open(target, &tag, inclusive);
                if state.close(&tag.name) {
                    return Ok(state.output);
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                if state.close(&name) {
                    return Ok(state.output);
                }
            }
            Event::Text(text) => state.text(&text.unescape()?),
            Event::CData(data) => state.text(&String::from_utf8_lossy(&data.into_inner())),
            Event::Eof => {
                return Err(SamlError::SignatureInvalid(
                    "referenced element not found".to_string(),
                ));
            }
            _ => {}
        }
    }
}
