//! Gateway errors and their HTTP rendering.
//!
//! Errors that happen while handling an authorize request with a known
//! client and registered redirect URI are sent back to the client as a
//! redirect (see [`MaxError::into_authorize_redirect`]). Everything else is
//! rendered as an OAuth style JSON body.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use max_cache::CacheError;
use max_crypto::CryptoError;
use max_protocol_oidc::{ErrorResponse, OidcError};
use max_protocol_saml::SamlError;
use thiserror::Error;

/// Result type for gateway operations.
pub type MaxResult<T> = Result<T, MaxError>;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum MaxError {
    /// OIDC protocol error.
    #[error(transparent)]
    Oidc(#[from] OidcError),

    /// SAML error.
    #[error(transparent)]
    Saml(#[from] SamlError),

    /// Cache backend error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The address exceeded its request budget. Carries the window in seconds.
    #[error("Too many requests from the same ip_address during the last {0} seconds.")]
    TooManyRequestsFromOrigin(u64),

    /// The identity provider user limit is reached and no overflow is available.
    #[error("Servers are too busy at this point, please try again later")]
    TooBusy,

    /// The identity provider outage flag is set.
    #[error("Some service we depend on is down.")]
    DependentServiceOutage,

    /// A rate limiter key the gateway relies on holds no value.
    #[error("Expected a value in the cache for {0}")]
    ExpectedCacheValue(String),

    /// Authorization by proxy was requested from an identity provider that cannot do it.
    #[error("Authorization by proxy is disabled for this provider")]
    AuthorizationByProxyDisabled,

    /// The identity provider uses a binding the gateway cannot send.
    #[error("Unexpected authn binding {0}")]
    UnexpectedAuthnBinding(String),

    /// No identity provider is configured under this name.
    #[error("Unknown identity provider {0}")]
    UnknownIdentityProvider(String),

    /// The user may not continue; sent to `redirect_uri` when known.
    #[error("{error_description}")]
    Unauthorized {
        /// Human readable reason.
        error_description: String,
        /// Where the browser should be sent.
        redirect_uri: Option<String>,
    },

    /// Sealing or opening a cached context failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

impl MaxError {
    /// Shorthand for an [`MaxError::Unauthorized`] without redirect.
    pub fn unauthorized(error_description: impl Into<String>) -> Self {
        Self::Unauthorized {
            error_description: error_description.into(),
            redirect_uri: None,
        }
    }

    /// OAuth style error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Oidc(err) => err.error_code(),
            Self::Saml(SamlError::Unauthorized(_)) | Self::Unauthorized { .. } => "unauthorized",
            Self::Saml(SamlError::StatusNotSuccess { .. }) | Self::AuthorizationByProxyDisabled => {
                "access_denied"
            }
            Self::TooManyRequestsFromOrigin(_) | Self::TooBusy | Self::DependentServiceOutage => {
                "temporarily_unavailable"
            }
            Self::Saml(_)
            | Self::Cache(_)
            | Self::ExpectedCacheValue(_)
            | Self::UnexpectedAuthnBinding(_)
            | Self::UnknownIdentityProvider(_)
            | Self::Crypto(_)
            | Self::Template(_) => "server_error",
        }
    }

    /// HTTP status for a JSON error response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        let code = match self {
            Self::Oidc(err) => err.http_status(),
            Self::Saml(err) => err.http_status(),
            Self::Unauthorized { .. } | Self::AuthorizationByProxyDisabled => 403,
            Self::TooManyRequestsFromOrigin(_) => 429,
            Self::TooBusy | Self::DependentServiceOutage => 503,
            Self::Cache(_)
            | Self::ExpectedCacheValue(_)
            | Self::UnexpectedAuthnBinding(_)
            | Self::UnknownIdentityProvider(_)
            | Self::Crypto(_)
            | Self::Template(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Errors raised by the rate limiter.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequestsFromOrigin(_) | Self::TooBusy | Self::DependentServiceOutage
        )
    }

    /// Whether the browser may be sent back to the client with this error.
    #[must_use]
    pub const fn is_redirectable(&self) -> bool {
        match self {
            Self::Oidc(err) => err.is_redirectable(),
            _ => true,
        }
    }

    /// Body of the JSON error response.
    #[must_use]
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.to_string(),
        }
    }

    /// Renders the error as a redirect for an authorize request.
    ///
    /// Rate limit errors go to the client's `error_page` when it has one,
    /// with `redirect_uri`, `client_id` and `state` in the query. All other
    /// errors go to `redirect_uri` with `error`, `error_description` and
    /// `state`.
    #[must_use]
    pub fn into_authorize_redirect(self, target: &AuthorizeRedirect<'_>) -> Response {
        if !self.is_redirectable() {
            return self.into_response();
        }

        if let Self::Unauthorized {
            redirect_uri: Some(uri),
            ..
        } = &self
        {
            let description = self.to_string();
            return temporary_redirect(&with_query(
                uri,
                &[("error", self.error_code()), ("error_description", description.as_str())],
            ));
        }

        if self.is_rate_limit() {
            if let Some(error_page) = target.error_page {
                tracing::info!(client_id = target.client_id, error = %self, "rate limited");
                return temporary_redirect(&with_query(
                    error_page,
                    &[
                        ("redirect_uri", target.redirect_uri),
                        ("client_id", target.client_id),
                        ("state", target.state),
                    ],
                ));
            }
        }

        tracing::info!(client_id = target.client_id, error = %self, "authorize request failed");
        let description = self.to_string();
        temporary_redirect(&with_query(
            target.redirect_uri,
            &[
                ("error", self.error_code()),
                ("error_description", description.as_str()),
                ("state", target.state),
            ],
        ))
    }
}

/// Where an authorize error is sent.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizeRedirect<'a> {
    /// Registered redirect URI of the request.
    pub redirect_uri: &'a str,
    /// Client state.
    pub state: &'a str,
    /// Client id.
    pub client_id: &'a str,
    /// The client's error page, if registered.
    pub error_page: Option<&'a str>,
}

impl IntoResponse for MaxError {
    fn into_response(self) -> Response {
        if let Self::Unauthorized {
            redirect_uri: Some(uri),
            ..
        } = &self
        {
            let description = self.to_string();
            return temporary_redirect(&with_query(
                uri,
                &[("error", self.error_code()), ("error_description", description.as_str())],
            ));
        }

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(self.to_error_response())).into_response()
    }
}

/// Appends query parameters to `base`, keeping any query it already has.
#[must_use]
pub fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = serde_urlencoded::to_string(params).unwrap_or_default();
    if query.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}

/// A `307 Temporary Redirect` to `location`.
#[must_use]
pub fn temporary_redirect(location: &str) -> Response {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TARGET: AuthorizeRedirect<'static> = AuthorizeRedirect {
        redirect_uri: "https://client/login",
        state: "xyz",
        client_id: "test_client",
        error_page: Some("https://client/error"),
    };

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[test]
    fn redirects_protocol_errors_to_client() {
        let response = MaxError::from(OidcError::InvalidScope("scope must contain openid".into()))
            .into_authorize_redirect(&TARGET);
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            location(&response),
            "https://client/login?error=invalid_scope&error_description=scope+must+contain+openid&state=xyz"
        );
    }

    #[test]
    fn rate_limit_errors_go_to_error_page() {
        let response = MaxError::TooBusy.into_authorize_redirect(&TARGET);
        assert_eq!(
            location(&response),
            "https://client/error?redirect_uri=https%3A%2F%2Fclient%2Flogin&client_id=test_client&state=xyz"
        );

        let without_page = AuthorizeRedirect {
            error_page: None,
            ..TARGET
        };
        let response = MaxError::TooManyRequestsFromOrigin(10).into_authorize_redirect(&without_page);
        assert!(location(&response).starts_with("https://client/login?error=temporarily_unavailable"));
    }

    #[test]
    fn unknown_client_is_not_redirected() {
        let response = MaxError::from(OidcError::InvalidClient("Client id x is not known".into()))
            .into_authorize_redirect(&TARGET);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[test]
    fn unauthorized_with_page_redirects() {
        let response = MaxError::Unauthorized {
            error_description: "No active login state found for this request.".to_string(),
            redirect_uri: Some("https://client/error".to_string()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).starts_with("https://client/error?error=unauthorized"));

        let response = MaxError::unauthorized("External authorization failed").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(MaxError::TooManyRequestsFromOrigin(5).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(MaxError::DependentServiceOutage.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            MaxError::UnexpectedAuthnBinding("SOAP".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            MaxError::from(SamlError::Unauthorized("External authorization failed".into())).error_code(),
            "unauthorized"
        );
    }

    #[test]
    fn with_query_appends() {
        assert_eq!(with_query("https://a/b?x=1", &[("y", "2 3")]), "https://a/b?x=1&y=2+3");
        assert_eq!(with_query("https://a/b", &[]), "https://a/b");
    }
}
