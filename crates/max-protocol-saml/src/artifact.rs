//! Artifact resolution over the SOAP back channel.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::constants::{BSN_SECTOR_PREFIX, SAML_NS, SAMLP_NS, SOAP_ENV_NS, STATUS_SUCCESS};
use crate::error::{SamlError, SamlResult};
use crate::settings::SamlSettings;
use crate::signature::XmlSigner;
use crate::xml::{self, XmlNode, escape_attr, escape_text};

/// A `samlp:ArtifactResolve` wrapped in a SOAP envelope.
#[derive(Debug, Clone)]
pub struct ArtifactResolveRequest {
    /// Request id.
    pub id: String,
    /// Creation time.
    pub issue_instant: DateTime<Utc>,
    /// Artifact resolution location.
    pub destination: String,
    /// Our entity id.
    pub issuer: String,
    /// The `SAMLart` received on the assertion consumer service.
    pub artifact: String,
}

impl ArtifactResolveRequest {
    /// A request resolving `artifact` at `destination`.
    pub fn new(
        artifact: impl Into<String>,
        destination: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            id: max_crypto::random::saml_id(),
            issue_instant: Utc::now(),
            destination: destination.into(),
            issuer: issuer.into(),
            artifact: artifact.into(),
        }
    }

    /// The `ArtifactResolve` element in canonical form, unsigned.
    #[must_use]
    pub fn resolve_xml(&self) -> String {
        format!(
            concat!(
                r#"<samlp:ArtifactResolve xmlns:samlp="{samlp}" Destination="{destination}" ID="{id}" IssueInstant="{instant}" Version="2.0">"#,
                r#"<saml:Issuer xmlns:saml="{saml}">{issuer}</saml:Issuer>"#,
                r#"<samlp:Artifact>{artifact}</samlp:Artifact>"#,
                r#"</samlp:ArtifactResolve>"#
            ),
            samlp = SAMLP_NS,
            saml = SAML_NS,
            destination = escape_attr(&self.destination),
            id = self.id,
            instant = self.issue_instant.format("%Y-%m-%dT%H:%M:%SZ"),
            issuer = escape_text(&self.issuer),
            artifact = escape_text(&self.artifact),
        )
    }

    /// The SOAP document to post, signed when a signer is given.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn to_soap(&self, signer: Option<&XmlSigner>) -> SamlResult<String> {
        let resolve = match signer {
            Some(signer) => signer.sign(&self.resolve_xml(), &self.id)?,
            None => self.resolve_xml(),
        };
        Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="{SOAP_ENV_NS}"><soapenv:Body>{resolve}</soapenv:Body></soapenv:Envelope>"#
        ))
    }
}

/// The parts of an `ArtifactResponse` MAX consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactResponse {
    /// `InResponseTo` of the artifact response.
    pub in_response_to: Option<String>,
    /// Issuer of the wrapped `Response`.
    pub issuer: Option<String>,
    /// `Destination` of the wrapped `Response`.
    pub destination: Option<String>,
    /// Audiences of the assertion.
    pub audiences: Vec<String>,
    /// `NameID` of the assertion subject.
    pub name_id: Option<String>,
    /// Attribute values by attribute name.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl ArtifactResponse {
    /// Parses an `ArtifactResponse`, bare or inside a SOAP envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::StatusNotSuccess`] when the artifact response or
    /// the wrapped response carries a non-success status, or a parse error.
    pub fn from_xml(document: &str) -> SamlResult<Self> {
        let root = xml::parse(document)?;
        let artifact_response = if root.name == "ArtifactResponse" {
            &root
        } else {
            root.find("ArtifactResponse")
                .ok_or_else(|| SamlError::MissingElement("ArtifactResponse".to_string()))?
        };
        check_status(artifact_response)?;

        let response = artifact_response
            .child("Response")
            .ok_or_else(|| SamlError::MissingElement("Response".to_string()))?;
        check_status(response)?;

        let assertion = response
            .child("Assertion")
            .ok_or_else(|| SamlError::MissingElement("Assertion".to_string()))?;

        let mut audiences = Vec::new();
        assertion.find_all("Audience", &mut audiences);

        let mut attribute_nodes = Vec::new();
        assertion.find_all("Attribute", &mut attribute_nodes);
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attribute in attribute_nodes {
            let Some(name) = attribute.attr("Name") else {
                continue;
            };
            attributes.entry(name.to_string()).or_default().extend(
                attribute
                    .children
                    .iter()
                    .filter(|value| value.name == "AttributeValue")
                    .map(|value| value.text().to_string()),
            );
        }

        Ok(Self {
            in_response_to: artifact_response.attr("InResponseTo").map(String::from),
            issuer: response.child("Issuer").map(|issuer| issuer.text().to_string()),
            destination: response.attr("Destination").map(String::from),
            audiences: audiences.iter().map(|a| a.text().to_string()).collect(),
            name_id: assertion.find("NameID").map(|name_id| name_id.text().to_string()),
            attributes,
        })
    }

    /// Checks destination and audience against our settings.
    ///
    /// Skipped entirely for `insecure` settings; only enforced when `strict`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidResponse`] on a mismatch.
    pub fn validate(&self, settings: &SamlSettings) -> SamlResult<()> {
        if settings.insecure || !settings.strict {
            return Ok(());
        }

        if let Some(expected) = &settings.sp_settings.response_destination {
            if self.destination.as_deref() != Some(expected.as_str()) {
                return Err(SamlError::InvalidResponse(format!(
                    "unexpected destination {:?}",
                    self.destination
                )));
            }
        }

        let entity_id = &settings.sp_settings.entity_id;
        if !self.audiences.is_empty() && !self.audiences.contains(entity_id) {
            return Err(SamlError::InvalidResponse(format!(
                "{entity_id} is not an audience of the assertion"
            )));
        }
        Ok(())
    }

    /// The citizen service number of the authenticated user.
    ///
    /// Taken from a `BSN` attribute, or else from a `NameID` in the BSN
    /// sector (`s00000000:{bsn}`). Other sectors carry no BSN.
    #[must_use]
    pub fn bsn(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.to_ascii_lowercase().ends_with("bsn"))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
            .or_else(|| {
                self.name_id
                    .as_deref()
                    .and_then(|name_id| name_id.strip_prefix(BSN_SECTOR_PREFIX))
            })
            .filter(|bsn| !bsn.is_empty())
    }
}

fn check_status(element: &XmlNode) -> SamlResult<()> {
    let status = element
        .child("Status")
        .ok_or_else(|| SamlError::MissingElement(format!("{}/Status", element.name)))?;

    let mut code = status.child("StatusCode");
    let top_level = code.and_then(|code| code.attr("Value")).unwrap_or_default();
    let mut most_specific = top_level;
    while let Some(current) = code {
        if let Some(value) = current.attr("Value") {
            most_specific = value;
        }
        code = current.child("StatusCode");
    }

    if top_level == STATUS_SUCCESS {
        return Ok(());
    }
    Err(SamlError::StatusNotSuccess {
        status: most_specific.to_string(),
        message: status
            .child("StatusMessage")
            .map(|message| message.text().to_string())
            .unwrap_or_default(),
    })
}
