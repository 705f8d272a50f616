//! `OpenID` Provider Metadata served at `/.well-known/openid-configuration`.

use serde::{Deserialize, Serialize};

/// Endpoint paths, relative to the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Authorization endpoint path.
    pub authorize: String,
    /// Token endpoint path.
    pub token: String,
    /// Userinfo endpoint path.
    pub userinfo: String,
    /// JWKS path.
    pub jwks: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize: "/authorize".to_string(),
            token: "/token".to_string(),
            userinfo: "/userinfo".to_string(),
            jwks: "/jwks".to_string(),
        }
    }
}

/// `OpenID` Provider Metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Userinfo endpoint URL.
    pub userinfo_endpoint: String,
    /// JWKS URL.
    pub jwks_uri: String,
    /// Supported scopes.
    pub scopes_supported: Vec<String>,
    /// Supported response types.
    pub response_types_supported: Vec<String>,
    /// Supported response modes.
    pub response_modes_supported: Vec<String>,
    /// Supported grant types.
    pub grant_types_supported: Vec<String>,
    /// Supported subject identifier types.
    pub subject_types_supported: Vec<String>,
    /// Supported id token signing algorithms.
    pub id_token_signing_alg_values_supported: Vec<String>,
    /// Supported token endpoint authentication methods.
    pub token_endpoint_auth_methods_supported: Vec<String>,
    /// Supported PKCE methods.
    pub code_challenge_methods_supported: Vec<String>,
    /// Whether the `claims` parameter is supported.
    pub claims_parameter_supported: bool,
}

fn one(value: &str) -> Vec<String> {
    vec![value.to_string()]
}

impl ProviderMetadata {
    /// Builds the metadata for `issuer_url` (`https://host[:port]`).
    #[must_use]
    pub fn new(issuer_url: &str, endpoints: &Endpoints) -> Self {
        let issuer = issuer_url.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}{}", endpoints.authorize),
            token_endpoint: format!("{issuer}{}", endpoints.token),
            userinfo_endpoint: format!("{issuer}{}", endpoints.userinfo),
            jwks_uri: format!("{issuer}{}", endpoints.jwks),
            scopes_supported: one("openid"),
            response_types_supported: one("code"),
            response_modes_supported: one("query"),
            grant_types_supported: one("authorization_code"),
            subject_types_supported: one("pairwise"),
            id_token_signing_alg_values_supported: one("RS256"),
            token_endpoint_auth_methods_supported: one("none"),
            code_challenge_methods_supported: one("S256"),
            claims_parameter_supported: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn metadata_for_issuer() {
        let metadata = ProviderMetadata::new("https://localhost:8006/", &Endpoints::default());
        assert_eq!(metadata.issuer, "https://localhost:8006");
        assert_eq!(
            metadata.authorization_endpoint,
            "https://localhost:8006/authorize"
        );
        assert_eq!(metadata.jwks_uri, "https://localhost:8006/jwks");
        assert_eq!(metadata.subject_types_supported, vec!["pairwise"]);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["claims_parameter_supported"], true);
        assert_eq!(json["token_endpoint_auth_methods_supported"][0], "none");
        assert_eq!(json["response_modes_supported"][0], "query");
    }
}
