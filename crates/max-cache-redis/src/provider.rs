//! Redis cache provider implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use fred::types::config::TlsConnector;
use max_cache::{Cache, CacheError, CacheResult};

use crate::config::RedisConfig;
use crate::debugger::RedisGetDebugger;
use crate::error::from_redis_error;

/// Redis-based cache.
pub struct RedisCache {
    client: Client,
    config: Arc<RedisConfig>,
}

impl RedisCache {
    /// Connects to Redis.
    ///
    /// When the debugger is enabled a second connection subscribes to key
    /// expiry events, see [`RedisGetDebugger`].
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(config: RedisConfig) -> CacheResult<Self> {
        let mut redis_config = Config::from_url(&config.connection_url())
            .map_err(|e| CacheError::Configuration(e.to_string()))?;
        if config.tls {
            let connector = TlsConnector::default_rustls().map_err(from_redis_error)?;
            redis_config.tls = Some(connector.into());
        }

        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        client.init().await.map_err(from_redis_error)?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            tls = config.tls,
            "connected to redis"
        );

        let config = Arc::new(config);
        if config.enable_debugger {
            RedisGetDebugger::new(client.clone_new(), Arc::clone(&config))
                .spawn()
                .await?;
        }

        Ok(Self { client, config })
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Key as stored in Redis.
    ///
    /// With the debugger enabled the key is repeated after the namespace so
    /// the key type is visible when inspecting the database.
    fn key(&self, key: &str) -> String {
        let prefixed = self.config.prefixed_key(key);
        if self.config.enable_debugger {
            format!("{prefixed}:{key}")
        } else {
            prefixed
        }
    }

    async fn debug_get(&self, stored_key: &str, value: Option<&str>) -> CacheResult<()> {
        let Some(value) = value else {
            tracing::debug!(key = %stored_key, "retrieved expired value");
            return Ok(());
        };
        let marker = self.config.retrieved_marker(stored_key);
        let ttl = seconds_to_i64(self.config.debug_marker_ttl_secs());
        self.client
            .set::<(), _, _>(&marker, value, Some(Expiration::EX(ttl)), None, false)
            .await
            .map_err(from_redis_error)
    }
}

/// Safely convert seconds to i64 for Redis expiration.
#[allow(clippy::cast_possible_wrap)]
const fn seconds_to_i64(seconds: u64) -> i64 {
    seconds as i64
}

#[async_trait]
impl Cache for RedisCache {
    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let key = self.key(key);
        self.client.incr(&key).await.map_err(from_redis_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let key = self.key(key);
        let seconds = seconds_to_i64(ttl.as_secs().max(1));
        self.client
            .expire::<bool, _>(&key, seconds, None)
            .await
            .map_err(from_redis_error)?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let key = self.key(key);
        let seconds = seconds_to_i64(ttl.as_secs().max(1));
        self.client
            .set::<(), _, _>(&key, value, Some(Expiration::EX(seconds)), None, false)
            .await
            .map_err(from_redis_error)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.key(key);
        let value: Option<String> = self.client.get(&key).await.map_err(from_redis_error)?;
        if self.config.enable_debugger {
            self.debug_get(&key, value.as_deref()).await?;
        }
        Ok(value)
    }

    async fn get_del(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.key(key);
        let value: Option<String> = self.client.getdel(&key).await.map_err(from_redis_error)?;
        if self.config.enable_debugger {
            self.debug_get(&key, value.as_deref()).await?;
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.key(key);
        self.client
            .del::<(), _>(&key)
            .await
            .map_err(from_redis_error)
    }

    async fn hset(&self, namespace: &str, key: &str, value: &str) -> CacheResult<()> {
        let hash = self.key(namespace);
        self.client
            .hset::<(), _, _>(&hash, (key, value))
            .await
            .map_err(from_redis_error)?;
        self.client
            .expire::<bool, _>(&hash, seconds_to_i64(self.config.object_ttl_secs), None)
            .await
            .map_err(from_redis_error)?;
        Ok(())
    }

    async fn hget(&self, namespace: &str, key: &str) -> CacheResult<Option<String>> {
        let hash = self.key(namespace);
        let value: Option<String> = self
            .client
            .hget(&hash, key)
            .await
            .map_err(from_redis_error)?;
        if self.config.enable_debugger {
            self.debug_get(&hash, value.as_deref()).await?;
        }
        Ok(value)
    }

    fn object_ttl(&self) -> Duration {
        Duration::from_secs(self.config.object_ttl_secs)
    }
}
