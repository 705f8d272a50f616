//! OIDC protocol error types.
//!
//! Error codes follow RFC 6749 section 4.1.2.1 and `OpenID` Connect Core
//! section 3.1.2.6.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OIDC protocol errors.
#[derive(Debug, Error)]
pub enum OidcError {
    /// Invalid request parameters.
    #[error("{0}")]
    InvalidRequest(String),

    /// Client is unknown.
    #[error("{0}")]
    InvalidClient(String),

    /// Redirect URI is not registered for the client.
    #[error("Redirect URI {0} is not registered for this client")]
    InvalidRedirectUri(String),

    /// Invalid or expired authorization grant.
    #[error("{0}")]
    InvalidGrant(String),

    /// Client is not authorized for this request.
    #[error("{0}")]
    UnauthorizedClient(String),

    /// Access denied by the user or identity provider.
    #[error("{0}")]
    AccessDenied(String),

    /// Unsupported response type.
    #[error("{0}")]
    UnsupportedResponseType(String),

    /// Unsupported grant type.
    #[error("{0}")]
    UnsupportedGrantType(String),

    /// Invalid scope.
    #[error("{0}")]
    InvalidScope(String),

    /// Server error.
    #[error("{0}")]
    ServerError(String),

    /// Temporarily unavailable.
    #[error("{0}")]
    TemporarilyUnavailable(String),

    /// Interaction required.
    #[error("interaction required")]
    InteractionRequired,

    /// Login required.
    #[error("login required")]
    LoginRequired,

    /// Account selection required.
    #[error("account selection required")]
    AccountSelectionRequired,

    /// Consent required.
    #[error("consent required")]
    ConsentRequired,

    /// `request_uri` is invalid.
    #[error("invalid request_uri")]
    InvalidRequestUri,

    /// Request object is invalid.
    #[error("invalid request object")]
    InvalidRequestObject,

    /// `request` parameter is not supported.
    #[error("request parameter not supported")]
    RequestNotSupported,

    /// `request_uri` parameter is not supported.
    #[error("request_uri parameter not supported")]
    RequestUriNotSupported,

    /// `registration` parameter is not supported.
    #[error("registration parameter not supported")]
    RegistrationNotSupported,

    /// Invalid or expired access token.
    #[error("{0}")]
    InvalidToken(String),

    /// Token signing error.
    #[error("token signing failed: {0}")]
    TokenSigning(String),

    /// Token validation error.
    #[error("token validation failed: {0}")]
    TokenValidation(String),
}

impl OidcError {
    /// Returns the OAuth 2.0 error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::AccessDenied(_) => "access_denied",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::TemporarilyUnavailable(_) => "temporarily_unavailable",
            Self::InteractionRequired => "interaction_required",
            Self::LoginRequired => "login_required",
            Self::AccountSelectionRequired => "account_selection_required",
            Self::ConsentRequired => "consent_required",
            Self::InvalidRequestUri => "invalid_request_uri",
            Self::InvalidRequestObject => "invalid_request_object",
            Self::RequestNotSupported => "request_not_supported",
            Self::RequestUriNotSupported => "request_uri_not_supported",
            Self::RegistrationNotSupported => "registration_not_supported",
            Self::InvalidToken(_) | Self::TokenValidation(_) => "invalid_token",
            Self::ServerError(_) | Self::TokenSigning(_) => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::UnauthorizedClient(_) | Self::AccessDenied(_) => 403,
            Self::InvalidToken(_) | Self::TokenValidation(_) => 401,
            Self::ServerError(_) | Self::TokenSigning(_) => 500,
            Self::TemporarilyUnavailable(_) => 503,
            _ => 400,
        }
    }

    /// Whether the user agent may be redirected back to the client with
    /// this error. Unknown clients and unregistered redirect URIs must not.
    #[must_use]
    pub const fn is_redirectable(&self) -> bool {
        !matches!(self, Self::InvalidClient(_) | Self::InvalidRedirectUri(_))
    }

    /// Creates an error response body.
    #[must_use]
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.to_string(),
        }
    }
}

/// OAuth 2.0 error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Human-readable error description.
    pub error_description: String,
}

/// Result type for OIDC operations.
pub type OidcResult<T> = Result<T, OidcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(OidcError::InvalidRequest(String::new()).http_status(), 400);
        assert_eq!(OidcError::UnauthorizedClient(String::new()).http_status(), 403);
        assert_eq!(OidcError::AccessDenied(String::new()).http_status(), 403);
        assert_eq!(OidcError::UnsupportedResponseType(String::new()).http_status(), 400);
        assert_eq!(OidcError::InvalidScope(String::new()).http_status(), 400);
        assert_eq!(OidcError::ServerError(String::new()).http_status(), 500);
        assert_eq!(
            OidcError::TemporarilyUnavailable(String::new()).http_status(),
            503
        );
        assert_eq!(OidcError::LoginRequired.http_status(), 400);
    }

    #[test]
    fn redirect_uri_errors_are_not_redirected() {
        let err = OidcError::InvalidRedirectUri("https://evil.example".to_string());
        assert_eq!(err.error_code(), "invalid_redirect_uri");
        assert_eq!(err.http_status(), 400);
        assert!(!err.is_redirectable());
        assert!(OidcError::LoginRequired.is_redirectable());
    }

    #[test]
    fn error_response_body() {
        let body = OidcError::InvalidScope("scope must contain openid".to_string())
            .to_error_response();
        assert_eq!(body.error, "invalid_scope");
        assert_eq!(body.error_description, "scope must contain openid");
    }
}
