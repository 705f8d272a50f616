//! In-process cache.
//!
//! Entries carry an optional expiry instant. They are dropped when read after
//! expiring, and every [`PURGE_INTERVAL`] writes the whole map is swept so
//! keys that are never read again (per second limiter counters) go too.
//! Suitable for tests and single instance development setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{CacheError, CacheResult};
use crate::provider::Cache;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Number of writes between sweeps of expired entries.
pub const PURGE_INTERVAL: usize = 256;

/// Cache backed by a concurrent hash map.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    object_ttl: Duration,
    writes: AtomicUsize,
}

impl MemoryCache {
    /// Creates an empty cache whose objects live for `object_ttl`.
    #[must_use]
    pub fn new(object_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            object_ttl,
            writes: AtomicUsize::new(0),
        }
    }

    /// Removes every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    fn record_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            self.purge_expired();
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // Re-checked under the write lock; a concurrent write may have
        // replaced the expired entry.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn incr(&self, key: &str) -> CacheResult<i64> {
        self.record_write();
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                value: Value::Str("0".to_string()),
                expires_at: None,
            };
        }

        let Value::Str(current) = &entry.value else {
            return Err(CacheError::InvalidValue(format!("{key} holds a hash")));
        };
        let next = current
            .parse::<i64>()
            .map_err(|_| CacheError::InvalidValue(format!("{key} is not an integer")))?
            + 1;
        entry.value = Value::Str(next.to_string());
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.record_write();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.live_value(key) {
            Some(Value::Str(value)) => Ok(Some(value)),
            Some(Value::Hash(_)) => Err(CacheError::InvalidValue(format!("{key} holds a hash"))),
            None => Ok(None),
        }
    }

    async fn get_del(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) if entry.is_expired(now) => Ok(None),
            Some((_, Entry { value: Value::Str(value), .. })) => Ok(Some(value)),
            Some(_) => Err(CacheError::InvalidValue(format!("{key} holds a hash"))),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn hset(&self, namespace: &str, key: &str, value: &str) -> CacheResult<()> {
        self.record_write();
        let now = Instant::now();
        let expires_at = Some(now + self.object_ttl);
        let mut entry = self.entries.entry(namespace.to_string()).or_insert(Entry {
            value: Value::Hash(HashMap::new()),
            expires_at,
        });
        if entry.is_expired(now) {
            entry.value = Value::Hash(HashMap::new());
        }
        entry.expires_at = expires_at;
        match &mut entry.value {
            Value::Hash(fields) => {
                fields.insert(key.to_string(), value.to_string());
                Ok(())
            }
            Value::Str(_) => Err(CacheError::InvalidValue(format!(
                "{namespace} holds a string"
            ))),
        }
    }

    async fn hget(&self, namespace: &str, key: &str) -> CacheResult<Option<String>> {
        match self.live_value(namespace) {
            Some(Value::Hash(fields)) => Ok(fields.get(key).cloned()),
            Some(Value::Str(_)) => Err(CacheError::InvalidValue(format!(
                "{namespace} holds a string"
            ))),
            None => Ok(None),
        }
    }

    fn object_ttl(&self) -> Duration {
        self.object_ttl
    }
}
