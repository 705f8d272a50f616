//! Cache provider traits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::CacheResult;

/// Key-value cache used for all short lived gateway state.
///
/// Implementations must be thread-safe. Values are strings; structured
/// values go through [`CacheExt`], which stores them as JSON. Keys are given
/// without namespace, implementations add their own prefix.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Atomically increments a counter, creating it at 1.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Sets the time to live of an existing key. Missing keys are ignored.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    /// Stores a value with the object TTL.
    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.set_with_ttl(key, value, self.object_ttl()).await
    }

    /// Stores a value with an explicit TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Reads a value. `None` when missing or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Reads and removes a value in one step.
    async fn get_del(&self, key: &str) -> CacheResult<Option<String>>;

    /// Removes a value. Missing keys are not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Sets a field in a hash. The hash receives the object TTL.
    async fn hset(&self, namespace: &str, key: &str, value: &str) -> CacheResult<()>;

    /// Reads a field from a hash.
    async fn hget(&self, namespace: &str, key: &str) -> CacheResult<Option<String>>;

    /// Default lifetime of stored objects.
    fn object_ttl(&self) -> Duration;

    /// Reads an integer. `None` when missing or not a number.
    async fn get_int(&self, key: &str) -> CacheResult<Option<i64>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|value| value.trim().parse().ok()))
    }

    /// Reads a flag. Only `true` and `1` (case-insensitive) are truthy.
    async fn get_bool(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .get(key)
            .await?
            .is_some_and(|value| is_truthy(&value)))
    }

    /// Reads a string value; alias of [`Cache::get`].
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        self.get(key).await
    }

    /// Generates a fresh, unguessable key.
    fn gen_token(&self) -> String {
        max_crypto::gen_token()
    }
}

/// Whether a cached flag value counts as set.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// JSON helpers for structured values, available on every [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Serializes `value` as JSON and stores it with the object TTL.
    async fn set_complex_object<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let json = serde_json::to_string(value)?;
        self.set(key, &json).await
    }

    /// Reads and deserializes a JSON value.
    async fn get_complex_object<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Reads, deserializes and removes a JSON value.
    async fn take_complex_object<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_del(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
