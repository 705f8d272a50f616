//! A configured SAML identity provider (DigiD, TVS).

use std::path::Path;
use std::time::Duration;

use crate::artifact::{ArtifactResolveRequest, ArtifactResponse};
use crate::authn_request::AuthnRequest;
use crate::bindings::HttpRedirectBinding;
use crate::constants::{AUTHORIZATION_BY_PROXY_SCOPING, DEFAULT_SCOPING, SamlBinding};
use crate::error::{SamlError, SamlResult};
use crate::metadata::IdpMetadata;
use crate::settings::{SamlSettings, SpecVersion};
use crate::signature::XmlSigner;
use crate::signature_validator::XmlSignatureValidator;

const BACK_CHANNEL_TIMEOUT: Duration = Duration::from_secs(30);

/// An identity provider together with our keys and its metadata.
#[derive(Debug)]
pub struct SamlIdentityProvider {
    name: String,
    settings: SamlSettings,
    metadata: IdpMetadata,
    signer: XmlSigner,
    validator: XmlSignatureValidator,
    http: reqwest::Client,
}

impl SamlIdentityProvider {
    /// Loads `saml/{name}/settings.json` style settings from `path`.
    ///
    /// Relative paths inside the settings are resolved against `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if settings, keys or metadata cannot be loaded.
    pub fn from_settings_file(name: &str, path: &Path, root: &Path) -> SamlResult<Self> {
        let settings = SamlSettings::from_file(path)?.resolve_paths(root);
        Self::new(name, settings)
    }

    /// Builds an identity provider from parsed settings.
    ///
    /// # Errors
    ///
    /// Returns an error if keys or metadata cannot be loaded, or the back
    /// channel client cannot be built.
    pub fn new(name: &str, settings: SamlSettings) -> SamlResult<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path)
                .map_err(|e| SamlError::Settings(format!("cannot read {}: {e}", path.display())))
        };
        let key_pem = read(&settings.sp_settings.key_path)?;
        let cert_pem = read(&settings.sp_settings.cert_path)?;

        let signer = XmlSigner::from_pem(&key_pem, Some(&cert_pem))?;
        let metadata = IdpMetadata::from_file(&settings.idp_settings.metadata_path)?;
        let validator =
            XmlSignatureValidator::from_base64_certificates(&metadata.signing_certificates)?;

        let identity = reqwest::Identity::from_pem(format!("{cert_pem}\n{key_pem}").as_bytes())
            .map_err(|e| SamlError::Crypto(format!("client certificate: {e}")))?;
        let http = reqwest::Client::builder()
            .identity(identity)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .timeout(BACK_CHANNEL_TIMEOUT)
            .build()
            .map_err(|e| SamlError::Settings(format!("http client: {e}")))?;

        tracing::info!(
            idp = name,
            entity_id = %metadata.entity_id,
            version = %settings.saml_specification_version,
            binding = %settings.idp_settings.authn_binding,
            "loaded SAML identity provider"
        );

        Ok(Self {
            name: name.to_string(),
            settings,
            metadata,
            signer,
            validator,
            http,
        })
    }

    /// Name under which the identity provider is configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings of this identity provider.
    #[must_use]
    pub const fn settings(&self) -> &SamlSettings {
        &self.settings
    }

    /// Parsed metadata.
    #[must_use]
    pub const fn metadata(&self) -> &IdpMetadata {
        &self.metadata
    }

    /// The `authn_binding` setting as written.
    #[must_use]
    pub fn authn_binding(&self) -> &str {
        &self.settings.idp_settings.authn_binding
    }

    /// The configured binding, if recognised.
    #[must_use]
    pub fn binding(&self) -> Option<SamlBinding> {
        self.settings.idp_settings.binding()
    }

    /// Identity providers implementing version 4.4 or later.
    #[must_use]
    pub fn saml_is_new_version(&self) -> bool {
        self.settings.saml_specification_version >= SpecVersion::new(4, 4)
    }

    /// Identity providers implementing version 3.5.
    #[must_use]
    pub fn saml_is_legacy_version(&self) -> bool {
        self.settings.saml_specification_version == SpecVersion::new(3, 5)
    }

    /// `(scoping_list, request_ids)` for a request.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ScopingAttributesNotAllowed`] for authorization
    /// by proxy against an identity provider that does not allow scoping.
    pub fn determine_scoping_attributes(
        &self,
        authorization_by_proxy: bool,
    ) -> SamlResult<(Vec<String>, Vec<String>)> {
        if self.settings.security.allow_scoping {
            return Ok(if authorization_by_proxy {
                (
                    vec![
                        DEFAULT_SCOPING.to_string(),
                        AUTHORIZATION_BY_PROXY_SCOPING.to_string(),
                    ],
                    vec![AUTHORIZATION_BY_PROXY_SCOPING.to_string()],
                )
            } else {
                (vec![DEFAULT_SCOPING.to_string()], Vec::new())
            });
        }

        if authorization_by_proxy {
            return Err(SamlError::ScopingAttributesNotAllowed(
                "Scoping for this provider has been disabled in the settings".to_string(),
            ));
        }
        Ok((Vec::new(), Vec::new()))
    }

    /// A new `AuthnRequest` addressed to the single sign-on location.
    ///
    /// # Errors
    ///
    /// See [`Self::determine_scoping_attributes`].
    pub fn create_authn_request(&self, authorization_by_proxy: bool) -> SamlResult<AuthnRequest> {
        let (scoping_list, request_ids) = self.determine_scoping_attributes(authorization_by_proxy)?;
        let sp = &self.settings.sp_settings;

        let mut request = AuthnRequest::new(self.sso_url(), sp.entity_id.clone())
            .with_scoping(scoping_list, request_ids);
        request
            .assertion_consumer_service_url
            .clone_from(&sp.assertion_consumer_service_url);
        request.assertion_consumer_service_index = sp.assertion_consumer_service_index;
        request.attribute_consuming_service_index = sp.attribute_consuming_service_index;
        request.provider_name.clone_from(&sp.provider_name);
        request.force_authn = self.saml_is_new_version();
        Ok(request)
    }

    /// Single sign-on location for the configured binding.
    #[must_use]
    pub fn sso_url(&self) -> &str {
        self.metadata.sso_location(self.binding())
    }

    /// XML of `request` for the POST binding, signed when
    /// `authnRequestsSigned` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn authn_request_xml(&self, request: &AuthnRequest) -> SamlResult<String> {
        let xml = request.to_xml();
        if self.settings.security.authn_requests_signed {
            self.signer.sign(&xml, &request.id)
        } else {
            Ok(xml)
        }
    }

    /// Redirect binding URL for `request`; the query is always signed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or signing fails.
    pub fn redirect_url(&self, request: &AuthnRequest, relay_state: &str) -> SamlResult<String> {
        HttpRedirectBinding::encode_request(
            &request.to_xml(),
            &request.destination,
            Some(relay_state),
            Some(&self.signer),
        )
    }

    /// An `ArtifactResolve` request for `artifact`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata has no artifact resolution service.
    pub fn create_artifact_resolve_request(&self, artifact: &str) -> SamlResult<ArtifactResolveRequest> {
        Ok(ArtifactResolveRequest::new(
            artifact,
            self.metadata.artifact_resolution_location()?,
            self.settings.sp_settings.entity_id.clone(),
        ))
    }

    /// Resolves `artifact` over the back channel.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ArtifactResolution`] when the identity provider
    /// cannot be reached, and [`SamlError::Unauthorized`] when the answer is
    /// not a usable artifact response.
    pub async fn resolve_artifact(&self, artifact: &str) -> SamlResult<ArtifactResponse> {
        let request = self.create_artifact_resolve_request(artifact)?;
        let body = request.to_soap(Some(&self.signer))?;

        let response = self
            .http
            .post(&request.destination)
            .header("SOAPAction", "resolve_artifact")
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| SamlError::ArtifactResolution(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| SamlError::ArtifactResolution(e.to_string()))?;

        self.read_artifact_response(&text)
    }

    /// Parses and checks the answer to an `ArtifactResolve`.
    ///
    /// With `strict` settings (and not `insecure`), the response must carry
    /// a valid signature from one of the metadata signing certificates.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::StatusNotSuccess`] for a non-success status,
    /// [`SamlError::SignatureInvalid`] or [`SamlError::InvalidResponse`] when
    /// a strict check fails, and [`SamlError::Unauthorized`] otherwise.
    pub fn read_artifact_response(&self, document: &str) -> SamlResult<ArtifactResponse> {
        let parsed = ArtifactResponse::from_xml(document).map_err(|e| match e {
            SamlError::StatusNotSuccess { .. } => e,
            other => {
                tracing::debug!(idp = %self.name, error = %other, "unusable artifact response");
                SamlError::Unauthorized("External authorization failed".to_string())
            }
        })?;

        if self.settings.strict && !self.settings.insecure {
            if let Err(err) = self.validator.validate_artifact_response(document) {
                tracing::warn!(idp = %self.name, error = %err, "rejected artifact response signature");
                return Err(err);
            }
        }
        parsed.validate(&self.settings)?;
        Ok(parsed)
    }
}
