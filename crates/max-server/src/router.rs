//! Router configuration.
//!
//! Combines the OIDC endpoints, the assertion consumer service, the health
//! check and (with `mock_digid`) the mock DigiD pages.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use max_protocol_oidc::{
    AuthorizeRequest, JsonWebKeySet, OidcError, ProviderMetadata, TokenRequest, TokenResponse,
};
use max_protocol_saml::HttpPostBinding;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authentication_cache::AuthenticationContext;
use crate::error::{MaxError, MaxResult, temporary_redirect, with_query};
use crate::saml_response_factory::{DIGID_MOCK_PATH, decode_mock_authorize_request};
use crate::state::AppState;
use crate::templates::{DigidMockTemplate, render};

/// Path of the assertion consumer service.
pub const ACS_PATH: &str = "/acs";

/// Path the mock DigiD page submits to.
pub const DIGID_MOCK_CATCH_PATH: &str = "/digid-mock-catch";

const MOCK_BSN: &str = "999991772";

/// Address of the connecting peer, when the server was started with
/// connect info.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddress(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddress {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        ))
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    let oidc = &state.config.oidc;
    let mut app = Router::new()
        .route("/.well-known/openid-configuration", get(well_known))
        .route(&oidc.jwks_endpoint, get(jwks))
        .route(&oidc.authorize_endpoint, get(authorize))
        .route(&oidc.token_endpoint, post(token))
        .route(&oidc.userinfo_endpoint, get(userinfo).post(userinfo))
        .route(ACS_PATH, get(assertion_consumer_service))
        .route("/health", get(health_check));

    if state.config.app.mock_digid {
        tracing::warn!("mock DigiD is enabled, never run this in production");
        app = app
            .route(DIGID_MOCK_PATH, post(digid_mock))
            .route(DIGID_MOCK_CATCH_PATH, get(digid_mock_catch));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn well_known(State(state): State<AppState>) -> Json<ProviderMetadata> {
    Json(state.provider.well_known())
}

async fn jwks(State(state): State<AppState>) -> Json<JsonWebKeySet> {
    Json(state.provider.jwks())
}

async fn authorize(
    State(state): State<AppState>,
    ClientAddress(client_address): ClientAddress,
    query: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    let Query(request) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return MaxError::from(OidcError::InvalidRequest(rejection.body_text()))
                .into_response();
        }
    };

    match state
        .provider
        .present_login_options_or_authorize(&request, client_address)
        .await
    {
        Ok(response) => response,
        Err(err) => state.provider.authorize_error_response(&request, err),
    }
}

async fn token(
    State(state): State<AppState>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> MaxResult<Json<TokenResponse>> {
    let Form(request) =
        form.map_err(|rejection| OidcError::InvalidRequest(rejection.body_text()))?;
    Ok(Json(state.provider.token(&request).await?))
}

async fn userinfo(State(state): State<AppState>, headers: HeaderMap) -> MaxResult<Response> {
    let token = bearer_token(&headers).ok_or_else(|| {
        OidcError::InvalidToken("missing bearer token".to_string())
    })?;
    let jwt = state.provider.userinfo(token).await?;
    Ok(([(header::CONTENT_TYPE, "application/jwt")], jwt).into_response())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Debug, Deserialize)]
struct AcsParams {
    #[serde(rename = "SAMLart")]
    saml_art: String,
    #[serde(rename = "RelayState")]
    relay_state: String,
    #[serde(default)]
    mocking: Option<String>,
}

async fn assertion_consumer_service(
    State(state): State<AppState>,
    Query(params): Query<AcsParams>,
) -> Response {
    let context = match state
        .provider
        .get_authentication_request_state(&params.relay_state)
        .await
    {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };

    let result = async {
        let bsn = resolve_bsn(&state, &context, &params).await?;
        let location = state
            .provider
            .handle_external_authentication(&context, &bsn)
            .await?;
        Ok::<_, MaxError>(temporary_redirect(&location))
    }
    .await;

    result.unwrap_or_else(|err| {
        state
            .provider
            .authorize_error_response(&context.authorization_request, err)
    })
}

async fn resolve_bsn(
    state: &AppState,
    context: &AuthenticationContext,
    params: &AcsParams,
) -> MaxResult<String> {
    if state.config.app.mock_digid && params.mocking.as_deref() == Some("1") {
        return Ok(params.saml_art.clone());
    }

    let identity_provider = state
        .identity_providers
        .get(&context.authentication_state.identity_provider)?;
    let artifact_response = identity_provider
        .resolve_artifact(&params.saml_art)
        .await
        .inspect_err(|err| {
            tracing::warn!(idp = identity_provider.name(), error = %err, "artifact resolution failed");
        })?;

    artifact_response
        .bsn()
        .map(str::to_string)
        .ok_or_else(|| MaxError::unauthorized("External authorization failed"))
}

#[derive(Debug, Deserialize)]
struct DigidMockQuery {
    state: String,
    idp_name: String,
    authorize_request: String,
}

#[derive(Debug, Deserialize)]
struct DigidMockForm {
    #[serde(rename = "SAMLRequest")]
    saml_request: String,
    #[serde(rename = "RelayState")]
    relay_state: String,
}

async fn digid_mock(
    Query(query): Query<DigidMockQuery>,
    Form(form): Form<DigidMockForm>,
) -> MaxResult<Response> {
    if form.relay_state != query.state {
        return Err(OidcError::InvalidRequest("RelayState does not match state".to_string()).into());
    }
    let authn_request = HttpPostBinding::decode(&form.saml_request)?;
    tracing::debug!(idp = %query.idp_name, bytes = authn_request.len(), "mock DigiD received AuthnRequest");

    let authorize_request = decode_mock_authorize_request(&query.authorize_request)
        .ok_or_else(|| OidcError::InvalidRequest("invalid authorize_request".to_string()))?;
    let cancel_url = with_query(
        &authorize_request.redirect_uri,
        &[
            ("error", "login_required"),
            ("error_description", "Authentication cancelled"),
            ("state", authorize_request.state.as_str()),
        ],
    );

    render(&DigidMockTemplate {
        state: query.state,
        idp_name: query.idp_name,
        client_id: authorize_request.client_id,
        bsn: MOCK_BSN.to_string(),
        cancel_url,
    })
}

#[derive(Debug, Deserialize)]
struct DigidMockCatchQuery {
    bsn: String,
    state: String,
}

async fn digid_mock_catch(Query(query): Query<DigidMockCatchQuery>) -> Response {
    temporary_redirect(&with_query(
        ACS_PATH,
        &[
            ("SAMLart", query.bsn.as_str()),
            ("RelayState", query.state.as_str()),
            ("mocking", "1"),
        ],
    ))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: &'static str,
    /// Server version.
    pub version: &'static str,
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  abc "));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn mock_catch_redirects_to_acs() {
        let response = digid_mock_catch(Query(DigidMockCatchQuery {
            bsn: "999991772".to_string(),
            state: "a+b/c=".to_string(),
        }))
        .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/acs?SAMLart=999991772&RelayState=a%2Bb%2Fc%3D&mocking=1"
        );
    }

    #[tokio::test]
    async fn mock_page_rejects_mismatched_relay_state() {
        let result = digid_mock(
            Query(DigidMockQuery {
                state: "one".to_string(),
                idp_name: "tvs".to_string(),
                authorize_request: String::new(),
            }),
            Form(DigidMockForm {
                saml_request: String::new(),
                relay_state: "two".to_string(),
            }),
        )
        .await;
        assert!(matches!(
            result,
            Err(MaxError::Oidc(OidcError::InvalidRequest(_)))
        ));
    }
}
