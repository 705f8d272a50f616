//! Application state shared by all request handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use max_cache::Cache;
use max_core::MaxConfig;
use max_crypto::SymmetricEncrypter;
use max_protocol_oidc::{AuthorizationState, Clients, TokenSigner};

use crate::authentication_cache::AuthenticationCache;
use crate::identity_providers::IdentityProviders;
use crate::login_handler::LoginHandlerFactory;
use crate::oidc_provider::{OidcProvider, OidcProviderParts};
use crate::rate_limiter::RateLimiter;
use crate::saml_response_factory::SamlResponseFactory;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<MaxConfig>,
    /// The OIDC provider.
    pub provider: Arc<OidcProvider>,
    /// SAML identity providers by name.
    pub identity_providers: Arc<IdentityProviders>,
}

impl AppState {
    /// Wires the state together from configuration files under `root`.
    ///
    /// # Errors
    ///
    /// Fails when the clients file, the signing key or an identity provider
    /// cannot be loaded.
    pub fn load(config: MaxConfig, root: &Path, cache: Arc<dyn Cache>) -> anyhow::Result<Self> {
        let clients_path = root.join(&config.oidc.clients_file);
        let clients = Clients::from_file(&clients_path)
            .with_context(|| format!("loading clients from {}", clients_path.display()))?;

        let key_path = root.join(&config.oidc.rsa_private_key);
        let private_key = std::fs::read_to_string(&key_path)
            .with_context(|| format!("reading signing key {}", key_path.display()))?;
        let signer = TokenSigner::new(
            &private_key,
            config.issuer_url(),
            Duration::from_secs(config.oidc.id_token_lifetime),
            config.oidc.kid.clone(),
        )
        .context("loading signing key")?;

        let identity_providers = IdentityProviders::load(&config.saml, root)
            .context("loading SAML identity providers")?;

        tracing::info!(
            clients = clients.len(),
            identity_providers = identity_providers.len(),
            "configuration loaded"
        );
        Self::new(config, clients, signer, identity_providers, cache)
    }

    /// Wires the state together from loaded parts.
    ///
    /// # Errors
    ///
    /// Fails when `redis.encryption_key` is set but is not a valid key.
    pub fn new(
        config: MaxConfig,
        clients: Clients,
        signer: TokenSigner,
        identity_providers: IdentityProviders,
        cache: Arc<dyn Cache>,
    ) -> anyhow::Result<Self> {
        let encrypter = config
            .redis
            .encryption_key
            .as_deref()
            .map(SymmetricEncrypter::from_hex)
            .transpose()
            .context("redis.encryption_key")?;

        let config = Arc::new(config);
        let signer = Arc::new(signer);
        let identity_providers = Arc::new(identity_providers);
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
                signer,
                config.oidc.subject_id_hash_salt.clone(),
            ),
            authentication_cache: Arc::new(AuthenticationCache::new(cache, encrypter)),
            rate_limiter: Arc::clone(&rate_limiter),
            login_handlers: LoginHandlerFactory::new(
                Arc::clone(&identity_providers),
                rate_limiter,
                SamlResponseFactory::new(config.app.mock_digid),
            ),
        });

        Ok(Self {
            config,
            provider: Arc::new(provider),
            identity_providers,
        })
    }
}
