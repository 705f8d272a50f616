//! Expired key debugger.
//!
//! When enabled, every successful read through [`crate::RedisCache`] writes
//! a `{namespace}:retrieved:{key}` marker that outlives the key by five
//! minutes. This task listens for `expired` keyspace events and logs keys in
//! our namespace that expired without a marker, i.e. were never read.
//!
//! Redis only publishes these events with `notify-keyspace-events` containing
//! `Ex`.

use std::sync::Arc;

use fred::prelude::*;
use max_cache::CacheResult;

use crate::config::RedisConfig;
use crate::error::from_redis_error;

/// Channel pattern for key expiry events in database 0.
pub const EXPIRED_EVENTS_PATTERN: &str = "__keyevent@0__:expired";

/// Listens for expiry events on a dedicated connection.
pub struct RedisGetDebugger {
    client: Client,
    config: Arc<RedisConfig>,
}

impl RedisGetDebugger {
    /// Creates a debugger on an uninitialised client.
    #[must_use]
    pub const fn new(client: Client, config: Arc<RedisConfig>) -> Self {
        Self { client, config }
    }

    /// Connects, subscribes and starts the listener task.
    ///
    /// ## Errors
    ///
    /// Returns an error if connecting or subscribing fails.
    pub async fn spawn(self) -> CacheResult<tokio::task::JoinHandle<()>> {
        self.client.init().await.map_err(from_redis_error)?;
        let lookup = self.client.clone_new();
        lookup.init().await.map_err(from_redis_error)?;

        let mut messages = self.client.message_rx();
        self.client
            .psubscribe(EXPIRED_EVENTS_PATTERN)
            .await
            .map_err(from_redis_error)?;
        tracing::debug!(pattern = EXPIRED_EVENTS_PATTERN, "start listening for redis events");

        let config = self.config;
        let subscriber = self.client;
        Ok(tokio::spawn(async move {
            while let Ok(message) = messages.recv().await {
                let Some(expired_key) = message.value.as_string() else {
                    continue;
                };
                if let Some(marker) = marker_for(&config, &expired_key) {
                    report_unretrieved(&lookup, &expired_key, &marker).await;
                }
            }
            tracing::debug!("stopped listening");
            drop(subscriber);
        }))
    }
}

/// Marker key to look up for an expired key, or `None` for keys outside our namespace.
fn marker_for(config: &RedisConfig, expired_key: &str) -> Option<String> {
    let namespace = format!("{}:", config.key_prefix);
    if !expired_key.starts_with(&namespace) {
        return None;
    }
    if expired_key.starts_with(&config.retrieved_marker("")) {
        return None;
    }
    Some(config.retrieved_marker(expired_key))
}

async fn report_unretrieved(lookup: &Client, expired_key: &str, marker: &str) {
    tracing::debug!(key = %marker, "attempting retrieval of debug-key");
    match lookup.exists::<i64, _>(marker).await {
        Ok(0) => tracing::debug!(key = %expired_key, "key has expired, but was never retrieved"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "debug-key lookup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_foreign_keys() {
        let config = RedisConfig::default().key_prefix("max");
        assert!(marker_for(&config, "other:key").is_none());
        assert!(marker_for(&config, "maximum:key").is_none());
    }

    #[test]
    fn ignores_its_own_markers() {
        let config = RedisConfig::default().key_prefix("max");
        assert!(marker_for(&config, "max:retrieved:max:code:code").is_none());
    }

    #[test]
    fn builds_marker_for_namespace_keys() {
        let config = RedisConfig::default().key_prefix("max");
        assert_eq!(
            marker_for(&config, "max:code:code").as_deref(),
            Some("max:retrieved:max:code:code")
        );
    }
}
