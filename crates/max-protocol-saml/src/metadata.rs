//! Identity provider metadata.

use std::path::Path;

use crate::constants::SamlBinding;
use crate::error::{SamlError, SamlResult};
use crate::xml::{self, XmlNode};

/// An endpoint published in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Binding URI.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
}

/// The parts of an identity provider's metadata MAX uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpMetadata {
    /// Entity id of the identity provider.
    pub entity_id: String,
    /// `SingleSignOnService` endpoints.
    pub single_sign_on_services: Vec<Endpoint>,
    /// `ArtifactResolutionService` endpoints.
    pub artifact_resolution_services: Vec<Endpoint>,
    /// Base64 DER signing certificates.
    pub signing_certificates: Vec<String>,
}

impl IdpMetadata {
    /// Parses an `EntityDescriptor`, or the first identity provider in an
    /// `EntitiesDescriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed XML or metadata without an
    /// `IDPSSODescriptor`.
    pub fn from_xml(metadata: &str) -> SamlResult<Self> {
        let root = xml::parse(metadata)?;
        let entity = if root.name == "EntityDescriptor" {
            &root
        } else {
            let mut entities = Vec::new();
            root.find_all("EntityDescriptor", &mut entities);
            entities
                .into_iter()
                .find(|entity| entity.child("IDPSSODescriptor").is_some())
                .ok_or_else(|| SamlError::Metadata("no identity provider entity".to_string()))?
        };

        let descriptor = entity
            .child("IDPSSODescriptor")
            .ok_or_else(|| SamlError::Metadata("missing IDPSSODescriptor".to_string()))?;

        let metadata = Self {
            entity_id: entity
                .attr("entityID")
                .ok_or_else(|| SamlError::Metadata("missing entityID".to_string()))?
                .to_string(),
            single_sign_on_services: endpoints(descriptor, "SingleSignOnService"),
            artifact_resolution_services: endpoints(descriptor, "ArtifactResolutionService"),
            signing_certificates: signing_certificates(descriptor),
        };

        if metadata.single_sign_on_services.is_empty() {
            return Err(SamlError::Metadata(format!(
                "{} publishes no SingleSignOnService",
                metadata.entity_id
            )));
        }
        Ok(metadata)
    }

    /// Reads a metadata file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> SamlResult<Self> {
        let path = path.as_ref();
        let metadata = std::fs::read_to_string(path)
            .map_err(|e| SamlError::Metadata(format!("cannot read {}: {e}", path.display())))?;
        Self::from_xml(&metadata)
    }

    /// Single sign-on location for `binding`, or the first one published.
    #[must_use]
    pub fn sso_location(&self, binding: Option<SamlBinding>) -> &str {
        binding
            .and_then(|binding| {
                self.single_sign_on_services
                    .iter()
                    .find(|endpoint| endpoint.binding == binding.uri())
            })
            .or_else(|| self.single_sign_on_services.first())
            .map_or("", |endpoint| endpoint.location.as_str())
    }

    /// Artifact resolution location (SOAP).
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata has no artifact resolution service.
    pub fn artifact_resolution_location(&self) -> SamlResult<&str> {
        self.artifact_resolution_services
            .iter()
            .find(|endpoint| endpoint.binding == SamlBinding::Soap.uri())
            .or_else(|| self.artifact_resolution_services.first())
            .map(|endpoint| endpoint.location.as_str())
            .ok_or_else(|| {
                SamlError::Metadata(format!(
                    "{} publishes no ArtifactResolutionService",
                    self.entity_id
                ))
            })
    }
}

fn endpoints(descriptor: &XmlNode, name: &str) -> Vec<Endpoint> {
    descriptor
        .children
        .iter()
        .filter(|child| child.name == name)
        .filter_map(|child| {
            Some(Endpoint {
                binding: child.attr("Binding")?.to_string(),
                location: child.attr("Location")?.to_string(),
            })
        })
        .collect()
}

fn signing_certificates(descriptor: &XmlNode) -> Vec<String> {
    descriptor
        .children
        .iter()
        .filter(|child| child.name == "KeyDescriptor" && child.attr("use") != Some("encryption"))
        .filter_map(|key| key.find("X509Certificate"))
        .map(|certificate| certificate.text().split_whitespace().collect())
        .collect()
}
