//! Login state kept between the authorize request, the assertion consumer
//! service, the token request and the userinfo request.
//!
//! Each stage stores a context under a random key and the next stage picks it
//! up. Contexts carry the BSN once the user has authenticated, so when an
//! encryption key is configured they are sealed before they reach the cache.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use max_cache::{Cache, CacheError};
use max_crypto::SymmetricEncrypter;
use max_protocol_oidc::AuthorizeRequest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MaxResult;

const AUTH_REQUEST_NAMESPACE: &str = "auth_req";
const ACS_CONTEXT_NAMESPACE: &str = "acs_context";
const USERINFO_NAMESPACE: &str = "userinfo_context";

/// Login method specific state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationState {
    /// Identity provider the user was sent to.
    pub identity_provider: String,
}

/// State of an authorize request while the user is at the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationContext {
    /// The authorize request that started the login.
    pub authorization_request: AuthorizeRequest,
    /// Login method the user is using.
    pub authentication_method: String,
    /// Login method specific state.
    pub authentication_state: AuthenticationState,
}

/// State of an authenticated user between the ACS and the token request,
/// keyed by authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcsContext {
    /// Client the code was issued to.
    pub client_id: String,
    /// Login method used.
    pub authentication_method: String,
    /// Login method specific state.
    pub authentication_state: AuthenticationState,
    /// Signed userinfo JWT.
    pub userinfo: String,
}

/// Userinfo waiting for the client, keyed by access token (or `at_hash` in
/// legacy mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserinfoContext {
    /// Client the access token was issued to.
    pub client_id: String,
    /// Login method used.
    pub authentication_method: String,
    /// Access token the userinfo belongs to.
    pub access_token: String,
    /// Signed userinfo JWT.
    pub userinfo: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RandState {
    state: String,
    client_id: String,
}

/// Typed access to the login state in the cache.
pub struct AuthenticationCache {
    cache: Arc<dyn Cache>,
    encrypter: Option<SymmetricEncrypter>,
}

impl AuthenticationCache {
    /// Creates the cache. With an `encrypter` every context is sealed.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, encrypter: Option<SymmetricEncrypter>) -> Self {
        Self { cache, encrypter }
    }

    /// Stores `context` and returns the `randstate` that travels through the
    /// identity provider as relay state.
    ///
    /// The randstate is base64 JSON carrying the cache key and the client id,
    /// so an expired login can still be sent to the client's error page.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable.
    pub async fn create_authentication_request_state(
        &self,
        context: &AuthenticationContext,
    ) -> MaxResult<String> {
        let state = self.cache.gen_token();
        self.store(&key(AUTH_REQUEST_NAMESPACE, &state), context)
            .await?;

        let randstate = RandState {
            state,
            client_id: context.authorization_request.client_id.clone(),
        };
        let json = serde_json::to_vec(&randstate).map_err(CacheError::from)?;
        Ok(STANDARD.encode(json))
    }

    /// The context behind `randstate`, or `None` when it expired or the
    /// randstate is malformed.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable.
    pub async fn get_authentication_request_state(
        &self,
        randstate: &str,
    ) -> MaxResult<Option<AuthenticationContext>> {
        let Some(decoded) = decode_randstate(randstate) else {
            return Ok(None);
        };
        self.load(&key(AUTH_REQUEST_NAMESPACE, &decoded.state), false)
            .await
    }

    /// Stores the context of an authenticated user under an authorization code.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable or sealing fails.
    pub async fn cache_acs_context(&self, code: &str, context: &AcsContext) -> MaxResult<()> {
        self.store(&key(ACS_CONTEXT_NAMESPACE, code), context).await
    }

    /// Takes the context stored under `code`. A second call returns `None`.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable or the context cannot be opened.
    pub async fn get_acs_context(&self, code: &str) -> MaxResult<Option<AcsContext>> {
        self.load(&key(ACS_CONTEXT_NAMESPACE, code), true).await
    }

    /// Makes the userinfo of `context` available under `userinfo_key`.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable or sealing fails.
    pub async fn cache_userinfo_context(
        &self,
        userinfo_key: &str,
        access_token: &str,
        context: &AcsContext,
    ) -> MaxResult<()> {
        let userinfo = UserinfoContext {
            client_id: context.client_id.clone(),
            authentication_method: context.authentication_method.clone(),
            access_token: access_token.to_string(),
            userinfo: context.userinfo.clone(),
        };
        self.store(&key(USERINFO_NAMESPACE, userinfo_key), &userinfo)
            .await
    }

    /// The userinfo stored under `userinfo_key`.
    ///
    /// # Errors
    ///
    /// Fails when the cache is unavailable or the context cannot be opened.
    pub async fn get_userinfo_context(&self, userinfo_key: &str) -> MaxResult<Option<UserinfoContext>> {
        self.load(&key(USERINFO_NAMESPACE, userinfo_key), false)
            .await
    }

    async fn store<T: Serialize + Sync>(&self, key: &str, value: &T) -> MaxResult<()> {
        let json = serde_json::to_string(value).map_err(CacheError::from)?;
        let stored = match &self.encrypter {
            Some(encrypter) => encrypter.encrypt(json.as_bytes())?,
            None => json,
        };
        self.cache.set(key, &stored).await?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str, take: bool) -> MaxResult<Option<T>> {
        let stored = if take {
            self.cache.get_del(key).await?
        } else {
            self.cache.get(key).await?
        };
        let Some(stored) = stored else {
            return Ok(None);
        };

        let json = match &self.encrypter {
            Some(encrypter) => encrypter.decrypt(&stored)?,
            None => stored.into_bytes(),
        };
        Ok(Some(serde_json::from_slice(&json).map_err(CacheError::from)?))
    }
}

/// Client id carried in a randstate, if it decodes.
#[must_use]
pub fn randstate_client_id(randstate: &str) -> Option<String> {
    decode_randstate(randstate).map(|decoded| decoded.client_id)
}

fn decode_randstate(randstate: &str) -> Option<RandState> {
    let json = STANDARD.decode(randstate.trim()).ok()?;
    serde_json::from_slice(&json).ok()
}

fn key(namespace: &str, id: &str) -> String {
    format!("{namespace}:{id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use max_cache::MemoryCache;

    fn authorize_request() -> AuthorizeRequest {
        AuthorizeRequest {
            client_id: "test_client".to_string(),
            redirect_uri: "https://client/login".to_string(),
            response_type: "code".to_string(),
            nonce: "n".to_string(),
            scope: "openid".to_string(),
            state: "xyz".to_string(),
            code_challenge: "_1f8tFjAtu6D1Df-GOyDPoMjCJdEvaSWsnqR6SLpzsw".to_string(),
            code_challenge_method: "S256".to_string(),
            login_hints: vec!["digid".to_string()],
            authorization_by_proxy: false,
        }
    }

    fn context() -> AuthenticationContext {
        AuthenticationContext {
            authorization_request: authorize_request(),
            authentication_method: "digid".to_string(),
            authentication_state: AuthenticationState {
                identity_provider: "digid".to_string(),
            },
        }
    }

    fn acs_context() -> AcsContext {
        AcsContext {
            client_id: "test_client".to_string(),
            authentication_method: "digid".to_string(),
            authentication_state: AuthenticationState {
                identity_provider: "digid".to_string(),
            },
            userinfo: "eyJ.userinfo.jwt".to_string(),
        }
    }

    fn caches() -> (Arc<dyn Cache>, AuthenticationCache, AuthenticationCache) {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
        let key = "00".repeat(32);
        let plain = AuthenticationCache::new(Arc::clone(&cache), None);
        let sealed = AuthenticationCache::new(
            Arc::clone(&cache),
            Some(SymmetricEncrypter::from_hex(&key).unwrap()),
        );
        (cache, plain, sealed)
    }

    #[tokio::test]
    async fn randstate_round_trip() {
        let (_, cache, _) = caches();
        let randstate = cache
            .create_authentication_request_state(&context())
            .await
            .unwrap();

        assert_eq!(randstate_client_id(&randstate).as_deref(), Some("test_client"));
        assert_eq!(
            cache.get_authentication_request_state(&randstate).await.unwrap(),
            Some(context())
        );
        assert_eq!(
            cache.get_authentication_request_state("not base64!").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn acs_context_is_consumed() {
        let (_, cache, _) = caches();
        cache.cache_acs_context("code", &acs_context()).await.unwrap();

        assert_eq!(cache.get_acs_context("code").await.unwrap(), Some(acs_context()));
        assert_eq!(cache.get_acs_context("code").await.unwrap(), None);
    }

    #[tokio::test]
    async fn userinfo_context_keeps_access_token() {
        let (_, cache, _) = caches();
        cache
            .cache_userinfo_context("key", "token", &acs_context())
            .await
            .unwrap();

        let userinfo = cache.get_userinfo_context("key").await.unwrap().unwrap();
        assert_eq!(userinfo.access_token, "token");
        assert_eq!(userinfo.userinfo, "eyJ.userinfo.jwt");
        assert_eq!(userinfo.client_id, "test_client");
    }

    #[tokio::test]
    async fn sealed_contexts_are_not_readable_in_the_cache() {
        let (raw, _, sealed) = caches();
        sealed.cache_acs_context("code", &acs_context()).await.unwrap();

        let stored = raw.get("acs_context:code").await.unwrap().unwrap();
        assert!(!stored.contains("eyJ.userinfo.jwt"));
        assert_eq!(sealed.get_acs_context("code").await.unwrap(), Some(acs_context()));
    }
}
