//! Authorization codes and access tokens.
//!
//! Codes and tokens are random cache keys; the grant they stand for is
//! stored as JSON under `authorization_code:{code}` and
//! `access_token:{token}`. Codes are consumed on first use.

use std::sync::Arc;

use max_cache::{Cache, CacheError, CacheExt};
use serde::{Deserialize, Serialize};

use crate::error::{OidcError, OidcResult};
use crate::pkce::PkceVerifier;
use crate::request::{AuthorizeRequest, TokenRequest};
use crate::token::{TokenResponse, TokenSigner};

const CODE_NAMESPACE: &str = "authorization_code";
const TOKEN_NAMESPACE: &str = "access_token";

/// Grant behind an authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// Client the code was issued to.
    pub client_id: String,
    /// Redirect URI of the authorize request.
    pub redirect_uri: String,
    /// Requested scope.
    pub scope: String,
    /// Nonce for the id token.
    pub nonce: String,
    /// PKCE challenge.
    pub code_challenge: String,
    /// Pairwise subject.
    pub sub: String,
}

/// Stored access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AccessTokenRecord {
    client_id: String,
    sub: String,
    scope: String,
    exp: i64,
}

/// Result of access token introspection (RFC 7662).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Introspection {
    /// Whether the token is known and unexpired.
    pub active: bool,
    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Pairwise subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiry, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Authorization state on top of a [`Cache`].
pub struct AuthorizationState {
    cache: Arc<dyn Cache>,
    signer: Arc<TokenSigner>,
    subject_salt: String,
}

fn cache_error(err: CacheError) -> OidcError {
    OidcError::ServerError(err.to_string())
}

impl AuthorizationState {
    /// Creates the authorization state.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, signer: Arc<TokenSigner>, subject_salt: impl Into<String>) -> Self {
        Self {
            cache,
            signer,
            subject_salt: subject_salt.into(),
        }
    }

    /// Pairwise subject identifier for a user at a client.
    #[must_use]
    pub fn pairwise_subject(&self, client_id: &str, user_id: &str) -> String {
        max_crypto::sha256_hex(format!("{client_id}{user_id}{}", self.subject_salt).as_bytes())
    }

    /// Issues an authorization code for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns `server_error` if the cache is unavailable.
    pub async fn create_authorization_code(
        &self,
        request: &AuthorizeRequest,
        user_id: &str,
    ) -> OidcResult<String> {
        let code = self.cache.gen_token();
        let grant = AuthorizationGrant {
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: request.scope.clone(),
            nonce: request.nonce.clone(),
            code_challenge: request.code_challenge.clone(),
            sub: self.pairwise_subject(&request.client_id, user_id),
        };
        self.cache
            .set_complex_object(&format!("{CODE_NAMESPACE}:{code}"), &grant)
            .await
            .map_err(cache_error)?;
        tracing::debug!(client_id = %grant.client_id, "issued authorization code");
        Ok(code)
    }

    /// Redeems an authorization code.
    ///
    /// The code is removed before any check, so a failed attempt also burns it.
    ///
    /// # Errors
    ///
    /// - `unsupported_grant_type` for anything but `authorization_code`
    /// - `invalid_grant` for unknown codes, client or redirect mismatches and
    ///   failed PKCE verification
    pub async fn exchange_code_for_token(&self, request: &TokenRequest) -> OidcResult<TokenResponse> {
        if request.grant_type != "authorization_code" {
            return Err(OidcError::UnsupportedGrantType(format!(
                "grant_type {} is not supported",
                request.grant_type
            )));
        }

        let grant: AuthorizationGrant = self
            .cache
            .take_complex_object(&format!("{CODE_NAMESPACE}:{}", request.code))
            .await
            .map_err(cache_error)?
            .ok_or_else(|| OidcError::InvalidGrant("unknown or expired code".to_string()))?;

        if request
            .client_id
            .as_deref()
            .is_some_and(|client_id| client_id != grant.client_id)
        {
            return Err(OidcError::InvalidGrant(
                "code was issued to another client".to_string(),
            ));
        }
        if request.redirect_uri != grant.redirect_uri {
            return Err(OidcError::InvalidGrant("redirect_uri mismatch".to_string()));
        }
        PkceVerifier::verify_s256(&request.code_verifier, &grant.code_challenge)?;

        let access_token = self.cache.gen_token();
        let (_, exp) = self.signer.validity();
        let record = AccessTokenRecord {
            client_id: grant.client_id.clone(),
            sub: grant.sub.clone(),
            scope: grant.scope.clone(),
            exp,
        };
        self.cache
            .set_complex_object(&format!("{TOKEN_NAMESPACE}:{access_token}"), &record)
            .await
            .map_err(cache_error)?;

        let id_token =
            self.signer
                .create_id_token(&grant.sub, &grant.client_id, &grant.nonce, &access_token)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.signer.lifetime().as_secs(),
            id_token,
        })
    }

    /// Looks up an access token.
    ///
    /// # Errors
    ///
    /// Returns `server_error` if the cache is unavailable.
    pub async fn introspect_access_token(&self, access_token: &str) -> OidcResult<Introspection> {
        let record: Option<AccessTokenRecord> = self
            .cache
            .get_complex_object(&format!("{TOKEN_NAMESPACE}:{access_token}"))
            .await
            .map_err(cache_error)?;

        Ok(match record {
            Some(record) if record.exp > chrono::Utc::now().timestamp() => Introspection {
                active: true,
                client_id: Some(record.client_id),
                sub: Some(record.sub),
                scope: Some(record.scope),
                exp: Some(record.exp),
            },
            _ => Introspection::default(),
        })
    }
}
