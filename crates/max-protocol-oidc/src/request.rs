//! Authorize and token request types.

use serde::{Deserialize, Serialize};

use crate::error::{OidcError, OidcResult};
use crate::pkce::S256;

/// Authorization endpoint request.
///
/// All OAuth parameters are required: MAX only serves the authorization
/// code flow with PKCE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    /// Client identifier.
    pub client_id: String,
    /// Where the code is delivered.
    pub redirect_uri: String,
    /// Must be `code`.
    pub response_type: String,
    /// Replay protection, echoed in the id token.
    pub nonce: String,
    /// Space separated scopes, must include `openid`.
    pub scope: String,
    /// Client state, echoed on redirect.
    pub state: String,
    /// PKCE challenge.
    pub code_challenge: String,
    /// PKCE method, must be `S256`.
    pub code_challenge_method: String,
    /// Preferred login methods, comma separated on the wire.
    #[serde(default, with = "comma_list", skip_serializing_if = "Vec::is_empty")]
    pub login_hints: Vec<String>,
    /// Log in on behalf of someone else.
    #[serde(default)]
    pub authorization_by_proxy: bool,
}

impl AuthorizeRequest {
    /// Checks the protocol parameters.
    ///
    /// Client and redirect URI checks need the client registry and are done
    /// by the provider.
    ///
    /// # Errors
    ///
    /// Returns the OAuth error matching the first invalid parameter.
    pub fn validate(&self) -> OidcResult<()> {
        if self.response_type != "code" {
            return Err(OidcError::UnsupportedResponseType(format!(
                "response_type {} is not supported",
                self.response_type
            )));
        }
        if !self.scope.split_whitespace().any(|scope| scope == "openid") {
            return Err(OidcError::InvalidScope(
                "scope must contain openid".to_string(),
            ));
        }
        if self.code_challenge_method != S256 {
            return Err(OidcError::InvalidRequest(
                "code_challenge_method must be S256".to_string(),
            ));
        }
        if self.code_challenge.is_empty() {
            return Err(OidcError::InvalidRequest(
                "code_challenge is required".to_string(),
            ));
        }
        Ok(())
    }

    /// The first login hint, if any.
    #[must_use]
    pub fn first_login_hint(&self) -> Option<&str> {
        self.login_hints.first().map(String::as_str)
    }
}

/// Token endpoint request (form encoded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Must be `authorization_code`.
    pub grant_type: String,
    /// The authorization code.
    pub code: String,
    /// Must equal the redirect URI of the authorize request.
    pub redirect_uri: String,
    /// PKCE verifier.
    pub code_verifier: String,
    /// Client identifier; public clients may omit it.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client state.
    #[serde(default)]
    pub state: Option<String>,
}

mod comma_list {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(values: &Vec<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&values.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map(str::to_string)
            .collect())
    }
}
