//! Sends the browser to the identity provider.

use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use max_protocol_oidc::AuthorizeRequest;
use max_protocol_saml::{HttpPostBinding, SamlBinding, SamlError, SamlIdentityProvider};

use crate::error::{MaxError, MaxResult, temporary_redirect, with_query};
use crate::templates::{AuthnRequestTemplate, render};

/// Path of the mock DigiD login page.
pub const DIGID_MOCK_PATH: &str = "/digid-mock";

/// Builds the response that starts the SAML login.
#[derive(Debug, Clone, Copy)]
pub struct SamlResponseFactory {
    mock_digid: bool,
}

impl SamlResponseFactory {
    /// With `mock_digid` every login goes to the built-in mock instead.
    #[must_use]
    pub const fn new(mock_digid: bool) -> Self {
        Self { mock_digid }
    }

    /// Auto-submit form (POST binding), signed redirect (Redirect binding) or
    /// the mock page.
    ///
    /// # Errors
    ///
    /// - [`MaxError::AuthorizationByProxyDisabled`] when the identity
    ///   provider cannot handle authorization by proxy
    /// - [`MaxError::UnexpectedAuthnBinding`] for other bindings
    pub fn create_saml_response(
        &self,
        identity_provider: &SamlIdentityProvider,
        authorize_request: &AuthorizeRequest,
        randstate: &str,
    ) -> MaxResult<Response> {
        if self.mock_digid {
            return Self::digid_mock_response(identity_provider, authorize_request, randstate);
        }
        match identity_provider.binding() {
            Some(SamlBinding::HttpPost) => {
                Self::authn_submit_response(identity_provider, authorize_request, randstate)
            }
            Some(SamlBinding::HttpRedirect) => {
                Self::authn_redirect_response(identity_provider, authorize_request, randstate)
            }
            _ => Err(MaxError::UnexpectedAuthnBinding(format!(
                "{} configured for identity provider {}",
                identity_provider.authn_binding(),
                identity_provider.name()
            ))),
        }
    }

    fn authn_submit_response(
        identity_provider: &SamlIdentityProvider,
        authorize_request: &AuthorizeRequest,
        randstate: &str,
    ) -> MaxResult<Response> {
        let authn_request = identity_provider
            .create_authn_request(authorize_request.authorization_by_proxy)
            .map_err(|err| match err {
                SamlError::ScopingAttributesNotAllowed(_) => MaxError::AuthorizationByProxyDisabled,
                other => other.into(),
            })?;
        let xml = identity_provider.authn_request_xml(&authn_request)?;

        render(&AuthnRequestTemplate {
            sso_url: authn_request.destination,
            saml_request: HttpPostBinding::encode(&xml),
            relay_state: randstate.to_string(),
        })
    }

    fn authn_redirect_response(
        identity_provider: &SamlIdentityProvider,
        authorize_request: &AuthorizeRequest,
        randstate: &str,
    ) -> MaxResult<Response> {
        if authorize_request.authorization_by_proxy {
            tracing::warn!(
                idp = identity_provider.name(),
                "authorization by proxy is not supported by this identity provider"
            );
            return Err(MaxError::AuthorizationByProxyDisabled);
        }
        let authn_request = identity_provider.create_authn_request(false)?;
        Ok(temporary_redirect(
            &identity_provider.redirect_url(&authn_request, randstate)?,
        ))
    }

    fn digid_mock_response(
        identity_provider: &SamlIdentityProvider,
        authorize_request: &AuthorizeRequest,
        randstate: &str,
    ) -> MaxResult<Response> {
        let json = serde_json::to_vec(authorize_request).map_err(max_cache::CacheError::from)?;
        let encoded_request = URL_SAFE.encode(json);
        let sso_url = with_query(
            DIGID_MOCK_PATH,
            &[
                ("state", randstate),
                ("idp_name", identity_provider.name()),
                ("authorize_request", encoded_request.as_str()),
            ],
        );
        let authn_request = identity_provider.create_authn_request(false)?;

        render(&AuthnRequestTemplate {
            sso_url,
            saml_request: HttpPostBinding::encode(&authn_request.to_xml()),
            relay_state: randstate.to_string(),
        })
    }
}

/// Decodes the `authorize_request` parameter of the mock page.
#[must_use]
pub fn decode_mock_authorize_request(encoded: &str) -> Option<AuthorizeRequest> {
    let json = URL_SAFE.decode(encoded.trim()).ok()?;
    serde_json::from_slice(&json).ok()
}
