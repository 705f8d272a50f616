//! # max-server
//!
//! HTTP server of the MAX identity gateway.
//!
//! Relying parties speak OIDC (authorization code flow with PKCE) to this
//! server; it authenticates users at DigiD or TVS over SAML and hands out
//! signed userinfo.
//!
//! ## Modules
//!
//! - [`oidc_provider`]: authorize, token and userinfo logic
//! - [`login_handler`]: login methods and their identity providers
//! - [`saml_response_factory`]: the response that starts a SAML login
//! - [`rate_limiter`]: per address and per identity provider limits
//! - [`authentication_cache`]: login state kept while the user is away
//! - [`router`]: HTTP routes
//!
//! ## Usage
//!
//! ```ignore
//! use max_core::MaxConfig;
//! use max_server::Server;
//!
//! let config = MaxConfig::from_env()?;
//! let server = Server::new(config, ".").await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod authentication_cache;
pub mod error;
pub mod identity_providers;
pub mod login_handler;
pub mod oidc_provider;
pub mod rate_limiter;
pub mod router;
pub mod saml_response_factory;
pub mod state;
pub mod templates;
pub mod userinfo;

pub use error::{MaxError, MaxResult};
pub use router::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use max_cache::Cache;
use max_cache_redis::{RedisCache, RedisConfig};
use max_core::MaxConfig;
use tokio::net::TcpListener;

/// The MAX server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Connects to Redis and loads clients, keys and identity providers
    /// relative to `root`.
    ///
    /// # Errors
    ///
    /// Fails when Redis is unreachable or a configured file cannot be loaded.
    pub async fn new(config: MaxConfig, root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let cache = RedisCache::new(RedisConfig::from(&config.redis))
            .await
            .context("connecting to redis")?;
        tracing::info!(host = %config.redis.host, port = config.redis.port, "redis connected");
        Self::with_cache(config, root, Arc::new(cache))
    }

    /// Like [`Server::new`] with a cache of the caller's choice.
    ///
    /// # Errors
    ///
    /// Fails when a configured file cannot be loaded.
    pub fn with_cache(
        config: MaxConfig,
        root: impl AsRef<Path>,
        cache: Arc<dyn Cache>,
    ) -> anyhow::Result<Self> {
        let state = AppState::load(config, root.as_ref(), cache)?;
        Ok(Self { state })
    }

    /// Runs the server on the configured address until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let server = &self.state.config.server;
        let addr = format!("{}:{}", server.host, server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Fails when the listener breaks.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("Server listening on http://{}", addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the application state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Creates the router without starting the server.
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
