//! Login methods.
//!
//! `digid` goes to whichever identity provider the rate limiter hands out
//! (primary or overflow). Any other method names a SAML identity provider
//! directly.

use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use max_protocol_oidc::{AuthorizeRequest, OidcError};

use crate::authentication_cache::AuthenticationState;
use crate::error::MaxResult;
use crate::identity_providers::IdentityProviders;
use crate::rate_limiter::RateLimiter;
use crate::saml_response_factory::SamlResponseFactory;

/// Login method that is load balanced over the DigiD identity providers.
pub const DIGID: &str = "digid";

/// A way for users to authenticate.
#[async_trait]
pub trait LoginHandler: Send + Sync {
    /// State to remember while the user is away, decided before the randstate exists.
    async fn authentication_state(
        &self,
        authorize_request: &AuthorizeRequest,
    ) -> MaxResult<AuthenticationState>;

    /// The response that sends the user off to authenticate.
    async fn authorize_response(
        &self,
        authorize_request: &AuthorizeRequest,
        authentication_state: &AuthenticationState,
        randstate: &str,
    ) -> MaxResult<Response>;
}

#[derive(Clone)]
struct SamlLoginContext {
    identity_providers: Arc<IdentityProviders>,
    response_factory: SamlResponseFactory,
}

impl SamlLoginContext {
    fn respond(
        &self,
        authorize_request: &AuthorizeRequest,
        authentication_state: &AuthenticationState,
        randstate: &str,
    ) -> MaxResult<Response> {
        let identity_provider = self
            .identity_providers
            .get(&authentication_state.identity_provider)?;
        self.response_factory
            .create_saml_response(&identity_provider, authorize_request, randstate)
    }
}

/// DigiD through the primary or overflow identity provider.
pub struct DigidLoginHandler {
    context: SamlLoginContext,
    rate_limiter: Arc<RateLimiter>,
}

#[async_trait]
impl LoginHandler for DigidLoginHandler {
    async fn authentication_state(
        &self,
        _authorize_request: &AuthorizeRequest,
    ) -> MaxResult<AuthenticationState> {
        let identity_provider = self.rate_limiter.select_identity_provider().await?;
        tracing::debug!(%identity_provider, "selected DigiD identity provider");
        Ok(AuthenticationState { identity_provider })
    }

    async fn authorize_response(
        &self,
        authorize_request: &AuthorizeRequest,
        authentication_state: &AuthenticationState,
        randstate: &str,
    ) -> MaxResult<Response> {
        self.context
            .respond(authorize_request, authentication_state, randstate)
    }
}

/// A named SAML identity provider, e.g. `tvs`.
pub struct SamlLoginHandler {
    context: SamlLoginContext,
    identity_provider: String,
}

#[async_trait]
impl LoginHandler for SamlLoginHandler {
    async fn authentication_state(
        &self,
        _authorize_request: &AuthorizeRequest,
    ) -> MaxResult<AuthenticationState> {
        Ok(AuthenticationState {
            identity_provider: self.identity_provider.clone(),
        })
    }

    async fn authorize_response(
        &self,
        authorize_request: &AuthorizeRequest,
        authentication_state: &AuthenticationState,
        randstate: &str,
    ) -> MaxResult<Response> {
        self.context
            .respond(authorize_request, authentication_state, randstate)
    }
}

/// Picks the handler for a login method.
pub struct LoginHandlerFactory {
    context: SamlLoginContext,
    rate_limiter: Arc<RateLimiter>,
}

impl LoginHandlerFactory {
    /// Creates the factory.
    #[must_use]
    pub fn new(
        identity_providers: Arc<IdentityProviders>,
        rate_limiter: Arc<RateLimiter>,
        response_factory: SamlResponseFactory,
    ) -> Self {
        Self {
            context: SamlLoginContext {
                identity_providers,
                response_factory,
            },
            rate_limiter,
        }
    }

    /// The handler for `login_method`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for a method with no identity provider.
    pub fn create(&self, login_method: &str) -> MaxResult<Box<dyn LoginHandler>> {
        if login_method == DIGID {
            return Ok(Box::new(DigidLoginHandler {
                context: self.context.clone(),
                rate_limiter: Arc::clone(&self.rate_limiter),
            }));
        }
        if self.context.identity_providers.contains(login_method) {
            return Ok(Box::new(SamlLoginHandler {
                context: self.context.clone(),
                identity_provider: login_method.to_string(),
            }));
        }
        Err(OidcError::InvalidRequest(format!("Unknown login method {login_method}")).into())
    }
}
