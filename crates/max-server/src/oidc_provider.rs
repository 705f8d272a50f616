//! The OIDC side of the gateway.
//!
//! A login runs through four requests:
//!
//! 1. `/authorize` validates the client, picks a login method and sends the
//!    user to the identity provider with a randstate as relay state.
//! 2. `/acs` receives the artifact, resolves it and
//!    [`OidcProvider::handle_external_authentication`] issues the code.
//! 3. `/token` exchanges the code and moves the userinfo to the access token.
//! 4. `/userinfo` hands the signed userinfo to the client.

use std::net::IpAddr;
use std::sync::Arc;

use axum::response::Response;
use max_core::MaxConfig;
use max_protocol_oidc::{
    AuthorizationState, AuthorizeRequest, Clients, Endpoints, IdTokenClaims, JsonWebKeySet,
    OidcError, ProviderMetadata, TokenRequest, TokenResponse, TokenSigner,
};

use crate::authentication_cache::{
    AcsContext, AuthenticationCache, AuthenticationContext, randstate_client_id,
};
use crate::error::{AuthorizeRedirect, MaxError, MaxResult, with_query};
use crate::login_handler::LoginHandlerFactory;
use crate::rate_limiter::RateLimiter;
use crate::templates::{LoginOption, LoginOptionsTemplate, render};
use crate::userinfo::UserinfoService;

/// Everything the provider works with.
pub struct OidcProviderParts {
    /// Gateway configuration.
    pub config: Arc<MaxConfig>,
    /// Registered clients.
    pub clients: Arc<Clients>,
    /// Token signer.
    pub signer: Arc<TokenSigner>,
    /// Authorization codes and access tokens.
    pub authorization_state: AuthorizationState,
    /// Login state.
    pub authentication_cache: Arc<AuthenticationCache>,
    /// Rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Login handlers.
    pub login_handlers: LoginHandlerFactory,
}

/// OIDC provider.
pub struct OidcProvider {
    config: Arc<MaxConfig>,
    clients: Arc<Clients>,
    signer: Arc<TokenSigner>,
    authorization_state: AuthorizationState,
    authentication_cache: Arc<AuthenticationCache>,
    rate_limiter: Arc<RateLimiter>,
    login_handlers: LoginHandlerFactory,
    userinfo_service: UserinfoService,
}

impl OidcProvider {
    /// Assembles the provider.
    #[must_use]
    pub fn new(parts: OidcProviderParts) -> Self {
        Self {
            userinfo_service: UserinfoService::new(Arc::clone(&parts.signer)),
            config: parts.config,
            clients: parts.clients,
            signer: parts.signer,
            authorization_state: parts.authorization_state,
            authentication_cache: parts.authentication_cache,
            rate_limiter: parts.rate_limiter,
            login_handlers: parts.login_handlers,
        }
    }

    fn endpoints(&self) -> Endpoints {
        let oidc = &self.config.oidc;
        Endpoints {
            authorize: oidc.authorize_endpoint.clone(),
            token: oidc.token_endpoint.clone(),
            userinfo: oidc.userinfo_endpoint.clone(),
            jwks: oidc.jwks_endpoint.clone(),
        }
    }

    /// Provider metadata for `/.well-known/openid-configuration`.
    #[must_use]
    pub fn well_known(&self) -> ProviderMetadata {
        ProviderMetadata::new(&self.config.issuer_url(), &self.endpoints())
    }

    /// Public signing keys.
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        self.signer.jwks()
    }

    /// Handles `/authorize`: shows the login options page when more than
    /// one login method applies, otherwise starts the login.
    ///
    /// # Errors
    ///
    /// Unknown clients and unregistered redirect URIs fail without a
    /// redirect target; see [`Self::authorize_error_response`] for the rest.
    pub async fn present_login_options_or_authorize(
        &self,
        authorize_request: &AuthorizeRequest,
        client_address: Option<IpAddr>,
    ) -> MaxResult<Response> {
        self.validate_authorize_request(authorize_request)?;

        let login_methods = self.applicable_login_methods(authorize_request);
        match login_methods.as_slice() {
            [login_method] => {
                self.authorize(authorize_request, login_method, client_address)
                    .await
            }
            _ => self.login_options_response(authorize_request, &login_methods),
        }
    }

    /// Starts a login with `login_method`.
    ///
    /// # Errors
    ///
    /// Rate limiter errors, a missing client address (`server_error`) and
    /// errors of the login handler.
    pub async fn authorize(
        &self,
        authorize_request: &AuthorizeRequest,
        login_method: &str,
        client_address: Option<IpAddr>,
    ) -> MaxResult<Response> {
        self.rate_limiter.validate_outage().await?;

        let Some(client_address) = client_address else {
            return Err(OidcError::ServerError(
                "No Client info available in the request content".to_string(),
            )
            .into());
        };
        self.rate_limiter
            .ip_limit_test(&client_address.to_string())
            .await?;

        let login_handler = self.login_handlers.create(login_method)?;
        let authentication_state = login_handler.authentication_state(authorize_request).await?;
        let context = AuthenticationContext {
            authorization_request: authorize_request.clone(),
            authentication_method: login_method.to_string(),
            authentication_state,
        };
        let randstate = self
            .authentication_cache
            .create_authentication_request_state(&context)
            .await?;

        tracing::info!(
            client_id = %authorize_request.client_id,
            login_method,
            identity_provider = %context.authentication_state.identity_provider,
            "starting login"
        );
        login_handler
            .authorize_response(authorize_request, &context.authentication_state, &randstate)
            .await
    }

    /// Renders an authorize error. Errors for a known client and registered
    /// redirect URI go back to the client; the rest is a JSON error.
    #[must_use]
    pub fn authorize_error_response(
        &self,
        authorize_request: &AuthorizeRequest,
        error: MaxError,
    ) -> Response {
        let error_page = self
            .clients
            .get(&authorize_request.client_id)
            .and_then(|client| client.error_page.as_deref());
        error.into_authorize_redirect(&AuthorizeRedirect {
            redirect_uri: &authorize_request.redirect_uri,
            state: &authorize_request.state,
            client_id: &authorize_request.client_id,
            error_page,
        })
    }

    /// The login context behind a randstate.
    ///
    /// # Errors
    ///
    /// Returns [`MaxError::Unauthorized`] when the login expired, pointing at
    /// the client's error page when the randstate names a known client.
    pub async fn get_authentication_request_state(
        &self,
        randstate: &str,
    ) -> MaxResult<AuthenticationContext> {
        if let Some(context) = self
            .authentication_cache
            .get_authentication_request_state(randstate)
            .await?
        {
            return Ok(context);
        }

        let redirect_uri = randstate_client_id(randstate)
            .and_then(|client_id| self.clients.get(&client_id))
            .and_then(|client| client.error_page.clone());
        Err(MaxError::Unauthorized {
            error_description: "No active login state found for this request.".to_string(),
            redirect_uri,
        })
    }

    /// Issues the authorization code for a user the identity provider
    /// authenticated, and returns the URL that delivers it to the client.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable or signing the userinfo fails.
    pub async fn handle_external_authentication(
        &self,
        context: &AuthenticationContext,
        bsn: &str,
    ) -> MaxResult<String> {
        let request = &context.authorization_request;
        let code = self
            .authorization_state
            .create_authorization_code(request, bsn)
            .await?;

        let subject = self
            .authorization_state
            .pairwise_subject(&request.client_id, bsn);
        let userinfo = self.userinfo_service.create_userinfo(
            &request.client_id,
            &subject,
            bsn,
            &context.authentication_method,
            &context.authentication_state.identity_provider,
        )?;

        let acs_context = AcsContext {
            client_id: request.client_id.clone(),
            authentication_method: context.authentication_method.clone(),
            authentication_state: context.authentication_state.clone(),
            userinfo,
        };
        self.authentication_cache
            .cache_acs_context(&code, &acs_context)
            .await?;

        Ok(with_query(
            &request.redirect_uri,
            &[("code", code.as_str()), ("state", request.state.as_str())],
        ))
    }

    /// Handles `/token`.
    ///
    /// # Errors
    ///
    /// `invalid_request` when the code has no login behind it, and the
    /// errors of the code exchange.
    pub async fn token(&self, token_request: &TokenRequest) -> MaxResult<TokenResponse> {
        let Some(acs_context) = self
            .authentication_cache
            .get_acs_context(&token_request.code)
            .await?
        else {
            return Err(OidcError::InvalidRequest(
                "Code challenge has expired. Please retry authorization.".to_string(),
            )
            .into());
        };

        let token_response = self
            .authorization_state
            .exchange_code_for_token(token_request)
            .await?;

        let userinfo_key = if self.config.is_legacy_mode() {
            let claims: IdTokenClaims = self.signer.verify(&token_response.id_token)?;
            claims.at_hash
        } else {
            token_response.access_token.clone()
        };
        self.authentication_cache
            .cache_userinfo_context(&userinfo_key, &token_response.access_token, &acs_context)
            .await?;

        tracing::info!(client_id = %acs_context.client_id, "issued tokens");
        Ok(token_response)
    }

    /// Handles `/userinfo` and returns the signed userinfo JWT.
    ///
    /// The bearer is the access token, or the id token in legacy mode.
    ///
    /// # Errors
    ///
    /// `invalid_token` when the token is unknown, expired or invalid.
    pub async fn userinfo(&self, bearer_token: &str) -> MaxResult<String> {
        let not_authorized = || MaxError::from(OidcError::InvalidToken("not authorized".to_string()));

        let (introspection, userinfo_context) = if self.config.is_legacy_mode() {
            let claims: IdTokenClaims = self.signer.verify(bearer_token)?;
            let context = self
                .authentication_cache
                .get_userinfo_context(&claims.at_hash)
                .await?
                .ok_or_else(not_authorized)?;
            let introspection = self
                .authorization_state
                .introspect_access_token(&context.access_token)
                .await?;
            (introspection, context)
        } else {
            let introspection = self
                .authorization_state
                .introspect_access_token(bearer_token)
                .await?;
            let context = self
                .authentication_cache
                .get_userinfo_context(bearer_token)
                .await?
                .ok_or_else(not_authorized)?;
            (introspection, context)
        };

        if !introspection.active {
            return Err(not_authorized());
        }
        Ok(userinfo_context.userinfo)
    }

    fn validate_authorize_request(&self, authorize_request: &AuthorizeRequest) -> MaxResult<()> {
        let client = self.clients.get(&authorize_request.client_id).ok_or_else(|| {
            OidcError::InvalidClient(format!(
                "Client id {} is not known for this OIDC server",
                authorize_request.client_id
            ))
        })?;
        if !client.allows_redirect_uri(&authorize_request.redirect_uri) {
            return Err(OidcError::InvalidRedirectUri(authorize_request.redirect_uri.clone()).into());
        }
        authorize_request.validate()?;
        Ok(())
    }

    /// Configured login methods named in the login hints, or all of them
    /// when none is hinted.
    fn applicable_login_methods(&self, authorize_request: &AuthorizeRequest) -> Vec<String> {
        let configured = &self.config.app.login_methods;
        let hinted: Vec<String> = configured
            .iter()
            .filter(|method| authorize_request.login_hints.contains(method))
            .cloned()
            .collect();
        if hinted.is_empty() {
            configured.clone()
        } else {
            hinted
        }
    }

    fn login_options_response(
        &self,
        authorize_request: &AuthorizeRequest,
        login_methods: &[String],
    ) -> MaxResult<Response> {
        let client_name = self
            .clients
            .get(&authorize_request.client_id)
            .map(|client| client.name.clone())
            .unwrap_or_default();

        let options = login_methods
            .iter()
            .map(|method| {
                let mut request = authorize_request.clone();
                request.login_hints = vec![method.clone()];
                let query = serde_urlencoded::to_string(&request)
                    .map_err(|e| OidcError::ServerError(e.to_string()))?;
                Ok(LoginOption {
                    label: method.clone(),
                    url: format!("{}?{query}", self.config.oidc.authorize_endpoint),
                })
            })
            .collect::<MaxResult<Vec<_>>>()?;

        render(&LoginOptionsTemplate {
            client_name,
            options,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use axum::http::{StatusCode, header};
    use max_cache::{Cache, MemoryCache};
    use max_protocol_oidc::{Client, PkceVerifier};

    use super::*;
    use crate::authentication_cache::AuthenticationState;
    use crate::identity_providers::IdentityProviders;
    use crate::saml_response_factory::SamlResponseFactory;

    const VERIFIER: &str = "SoOEDN-mZKNhw7Mc52VXxyiqTvFB3mod36MwPru253c";
    const ADDRESS: Option<IpAddr> = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

    struct Fixture {
        cache: Arc<dyn Cache>,
        signer: Arc<TokenSigner>,
        provider: OidcProvider,
    }

    fn fixture(configure: impl FnOnce(&mut MaxConfig)) -> Fixture {
        let mut config = MaxConfig::for_testing();
        configure(&mut config);
        let config = Arc::new(config);

        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let signer = Arc::new(
            TokenSigner::new(
                include_str!("../../../testdata/oidc.key"),
                config.issuer_url(),
                Duration::from_secs(600),
                None,
            )
            .unwrap(),
        );
        let mut clients = Clients::default();
        clients.insert(
            "test_client",
            Client {
                name: "Test Client".to_string(),
                redirect_uris: vec!["https://client/login".to_string()],
                error_page: Some("https://client/error".to_string()),
                response_types: vec!["code".to_string()],
                token_endpoint_auth_method: "none".to_string(),
            },
        );
        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::clone(&cache),
            config.ratelimiter.clone(),
        ));

        let provider = OidcProvider::new(OidcProviderParts {
            config: Arc::clone(&config),
            clients: Arc::new(clients),
            signer: Arc::clone(&signer),
            authorization_state: AuthorizationState::new(
                Arc::clone(&cache),
                Arc::clone(&signer),
                "salt",
            ),
            authentication_cache: Arc::new(AuthenticationCache::new(Arc::clone(&cache), None)),
            rate_limiter: Arc::clone(&rate_limiter),
            login_handlers: LoginHandlerFactory::new(
                Arc::new(IdentityProviders::default()),
                rate_limiter,
                SamlResponseFactory::new(true),
            ),
        });
        Fixture {
            cache,
            signer,
            provider,
        }
    }

    fn authorize_request(login_hints: &[&str]) -> AuthorizeRequest {
        AuthorizeRequest {
            client_id: "test_client".to_string(),
            redirect_uri: "https://client/login".to_string(),
            response_type: "code".to_string(),
            nonce: "n".to_string(),
            scope: "openid".to_string(),
            state: "xyz".to_string(),
            code_challenge: PkceVerifier::challenge(VERIFIER),
            code_challenge_method: "S256".to_string(),
            login_hints: login_hints.iter().map(ToString::to_string).collect(),
            authorization_by_proxy: false,
        }
    }

    fn context(request: AuthorizeRequest) -> AuthenticationContext {
        AuthenticationContext {
            authorization_request: request,
            authentication_method: "digid".to_string(),
            authentication_state: AuthenticationState {
                identity_provider: "digid".to_string(),
            },
        }
    }

    fn token_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: "authorization_code".to_string(),
            code: code.to_string(),
            redirect_uri: "https://client/login".to_string(),
            code_verifier: VERIFIER.to_string(),
            client_id: Some("test_client".to_string()),
            state: None,
        }
    }

    fn code_from(url: &str) -> String {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "code")
            .unwrap()
            .1
            .into_owned()
    }

    #[test]
    fn well_known_uses_configured_endpoints() {
        let fixture = fixture(|config| config.oidc.token_endpoint = "/oauth/token".to_string());
        let metadata = fixture.provider.well_known();
        assert_eq!(metadata.issuer, "https://localhost:8006");
        assert_eq!(metadata.token_endpoint, "https://localhost:8006/oauth/token");
        assert_eq!(fixture.provider.jwks().keys.len(), 1);
    }

    #[tokio::test]
    async fn unknown_client_and_redirect_are_not_redirected() {
        let fixture = fixture(|_| {});

        let mut request = authorize_request(&[]);
        request.client_id = "unknown".to_string();
        let err = fixture
            .provider
            .present_login_options_or_authorize(&request, ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_client");
        assert!(!err.is_redirectable());

        let mut request = authorize_request(&[]);
        request.redirect_uri = "https://evil/login".to_string();
        let err = fixture
            .provider
            .present_login_options_or_authorize(&request, ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.is_redirectable());
    }

    #[tokio::test]
    async fn several_login_methods_show_options() {
        let fixture = fixture(|config| {
            config.app.login_methods = vec!["digid".to_string(), "tvs".to_string()];
        });
        let response = fixture
            .provider
            .present_login_options_or_authorize(&authorize_request(&[]), ADDRESS)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("login_hints=digid"));
        assert!(html.contains("login_hints=tvs"));
    }

    #[tokio::test]
    async fn outage_and_missing_address_fail() {
        let fixture = fixture(|_| {});
        let err = fixture
            .provider
            .authorize(&authorize_request(&[]), "digid", None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "server_error");

        fixture.cache.set("identity_provider_outage", "1").await.unwrap();
        let err = fixture
            .provider
            .authorize(&authorize_request(&[]), "digid", ADDRESS)
            .await
            .unwrap_err();
        assert!(matches!(err, MaxError::DependentServiceOutage));

        let response = fixture
            .provider
            .authorize_error_response(&authorize_request(&[]), err);
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(
            response.headers()[header::LOCATION]
                .to_str()
                .unwrap()
                .starts_with("https://client/error?")
        );
    }

    #[tokio::test]
    async fn expired_login_points_at_error_page() {
        let fixture = fixture(|_| {});
        let randstate = fixture
            .provider
            .authentication_cache
            .create_authentication_request_state(&context(authorize_request(&[])))
            .await
            .unwrap();
        assert!(
            fixture
                .provider
                .get_authentication_request_state(&randstate)
                .await
                .is_ok()
        );

        let stale = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            r#"{"state":"missing","client_id":"test_client"}"#,
        );
        let err = fixture
            .provider
            .get_authentication_request_state(&stale)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MaxError::Unauthorized { redirect_uri: Some(ref uri), .. } if uri == "https://client/error"
        ));
    }

    #[tokio::test]
    async fn code_token_userinfo_flow() {
        let fixture = fixture(|_| {});
        let url = fixture
            .provider
            .handle_external_authentication(&context(authorize_request(&[])), "999991772")
            .await
            .unwrap();
        assert!(url.starts_with("https://client/login?code="));
        assert!(url.ends_with("&state=xyz"));

        let code = code_from(&url);
        let tokens = fixture.provider.token(&token_request(&code)).await.unwrap();
        assert_eq!(tokens.token_type, "Bearer");

        let err = fixture.provider.token(&token_request(&code)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Code challenge has expired. Please retry authorization."
        );
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let userinfo = fixture.provider.userinfo(&tokens.access_token).await.unwrap();
        let claims: crate::userinfo::UserinfoClaims = fixture.signer.verify(&userinfo).unwrap();
        assert_eq!(claims.bsn, "999991772");

        let err = fixture.provider.userinfo("bogus").await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_token");
    }

    #[tokio::test]
    async fn legacy_mode_keys_userinfo_by_id_token() {
        let fixture = fixture(|config| config.app.app_mode = "legacy".to_string());
        let url = fixture
            .provider
            .handle_external_authentication(&context(authorize_request(&[])), "999991772")
            .await
            .unwrap();
        let tokens = fixture
            .provider
            .token(&token_request(&code_from(&url)))
            .await
            .unwrap();

        assert!(fixture.provider.userinfo(&tokens.id_token).await.is_ok());
        assert!(fixture.provider.userinfo(&tokens.access_token).await.is_err());
    }
}
