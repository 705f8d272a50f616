//! Redis connection configuration.

use max_core::config::RedisSection;
use serde::{Deserialize, Serialize};

/// Extra lifetime of the debugger's `retrieved` markers, in seconds.
pub const DEBUG_MARKER_GRACE_SECS: u64 = 300;

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis server host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Redis server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redis password (optional).
    pub password: Option<String>,
    /// Redis database number.
    #[serde(default)]
    pub database: u8,
    /// Use TLS for connection.
    #[serde(default)]
    pub tls: bool,
    /// Namespace prepended to every key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Lifetime of stored objects in seconds.
    #[serde(default = "default_object_ttl")]
    pub object_ttl_secs: u64,
    /// Record reads and report keys that expire unread.
    #[serde(default)]
    pub enable_debugger: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            database: 0,
            tls: false,
            key_prefix: default_key_prefix(),
            object_ttl_secs: default_object_ttl(),
            enable_debugger: false,
        }
    }
}

impl From<&RedisSection> for RedisConfig {
    fn from(section: &RedisSection) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
            password: section.password.clone(),
            database: section.database,
            tls: section.ssl,
            key_prefix: section.default_cache_namespace.clone(),
            object_ttl_secs: section.object_ttl,
            enable_debugger: section.enable_debugger,
        }
    }
}

impl RedisConfig {
    /// Creates a new Redis configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Redis host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the Redis port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the Redis password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enables TLS.
    #[must_use]
    pub const fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the object lifetime.
    #[must_use]
    pub const fn object_ttl_secs(mut self, secs: u64) -> Self {
        self.object_ttl_secs = secs;
        self
    }

    /// Enables the expiry debugger.
    #[must_use]
    pub const fn enable_debugger(mut self, enabled: bool) -> Self {
        self.enable_debugger = enabled;
        self
    }

    /// Builds the Redis connection URL. The password is percent-encoded.
    #[must_use]
    pub fn connection_url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let auth = self
            .password
            .as_deref()
            .map(|p| format!(":{}@", urlencoding::encode(p)))
            .unwrap_or_default();
        format!(
            "{scheme}://{auth}{host}:{port}/{db}",
            host = self.host,
            port = self.port,
            db = self.database
        )
    }

    /// Formats a key with the configured prefix.
    #[must_use]
    pub fn prefixed_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    /// Key under which the debugger records that `stored_key` was read.
    #[must_use]
    pub fn retrieved_marker(&self, stored_key: &str) -> String {
        format!("{}:retrieved:{stored_key}", self.key_prefix)
    }

    /// Lifetime of debugger markers: object lifetime plus a grace period.
    #[must_use]
    pub const fn debug_marker_ttl_secs(&self) -> u64 {
        self.object_ttl_secs + DEBUG_MARKER_GRACE_SECS
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "max".to_string()
}

const fn default_object_ttl() -> u64 {
    600
}
