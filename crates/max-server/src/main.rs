//! # MAX server
//!
//! Loads `max.conf` (or the file named by `MAX_CONFIG`) and serves the
//! gateway from the current directory.

#![forbid(unsafe_code)]
#![deny(warnings)]

use anyhow::Context as _;
use max_core::MaxConfig;
use max_server::Server;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MaxConfig::from_env().context("loading configuration")?;

    let level = config.tracing_level()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        environment = %config.app.environment,
        app_mode = %config.app.app_mode,
        mock_digid = config.app.mock_digid,
        "MAX starting"
    );

    Server::new(config, ".").await?.run().await
}
