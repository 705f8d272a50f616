//! Request throttling and identity provider selection.
//!
//! Limits and provider names live in the cache so operators can change them
//! at runtime:
//!
//! - the outage flag stops all logins while set,
//! - every client address gets `ipaddress_max_count` authorize requests per
//!   `ipaddress_max_count_expire_seconds`,
//! - the primary identity provider accepts at most its user limit of new
//!   logins per second, after which logins spill over to the overflow
//!   provider when one is configured.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use max_cache::Cache;
use max_core::config::RateLimiterSection;

use crate::error::{MaxError, MaxResult};

const USER_LIMIT_WINDOW: Duration = Duration::from_secs(2);

/// Rate limiter on top of the shared cache.
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    config: RateLimiterSection,
}

impl RateLimiter {
    /// Creates a rate limiter.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, config: RateLimiterSection) -> Self {
        Self { cache, config }
    }

    /// Fails with [`MaxError::DependentServiceOutage`] while the outage flag is set.
    ///
    /// # Errors
    ///
    /// Also fails when the cache is unavailable.
    pub async fn validate_outage(&self) -> MaxResult<()> {
        if let Some(key) = &self.config.identity_provider_outage_key {
            if self.cache.get_bool(key).await? {
                tracing::warn!(%key, "identity provider outage flag is set");
                return Err(MaxError::DependentServiceOutage);
            }
        }
        Ok(())
    }

    /// Counts a request from `ip_address`.
    ///
    /// # Errors
    ///
    /// Returns [`MaxError::TooManyRequestsFromOrigin`] once the address
    /// exceeds its budget for the current window.
    pub async fn ip_limit_test(&self, ip_address: &str) -> MaxResult<()> {
        let key = format!("ipv4:{ip_address}");
        let count = self.cache.incr(&key).await?;
        self.cache
            .expire(
                &key,
                Duration::from_secs(self.config.ipaddress_max_count_expire_seconds),
            )
            .await?;

        if count > self.config.ipaddress_max_count {
            tracing::info!(ip_address, count, "too many requests from origin");
            return Err(MaxError::TooManyRequestsFromOrigin(
                self.config.ipaddress_max_count_expire_seconds,
            ));
        }
        Ok(())
    }

    /// Applies the address limit and picks the identity provider for a new login.
    ///
    /// # Errors
    ///
    /// See [`Self::ip_limit_test`] and [`Self::select_identity_provider`].
    pub async fn get_identity_provider_name_and_validate_request(
        &self,
        ip_address: &str,
    ) -> MaxResult<String> {
        self.ip_limit_test(ip_address).await?;
        self.select_identity_provider().await
    }

    /// The primary identity provider, or the overflow provider while the
    /// primary is at its user limit.
    ///
    /// # Errors
    ///
    /// Returns [`MaxError::TooBusy`] when both are full (or there is no
    /// overflow provider) and [`MaxError::ExpectedCacheValue`] when the
    /// primary provider name is not set.
    pub async fn select_identity_provider(&self) -> MaxResult<String> {
        let primary = self
            .cache
            .get_string(&self.config.primary_identity_provider_key)
            .await?
            .ok_or_else(|| {
                MaxError::ExpectedCacheValue(self.config.primary_identity_provider_key.clone())
            })?;

        match self
            .user_limit_test(&self.config.primary_identity_provider_user_limit_key, &primary)
            .await
        {
            Ok(()) => Ok(primary),
            Err(MaxError::TooBusy) => {
                let Some(overflow) = self
                    .cache
                    .get_string(&self.config.overflow_identity_provider_key)
                    .await?
                else {
                    return Err(MaxError::TooBusy);
                };
                self.user_limit_test(&self.config.overflow_identity_provider_user_limit_key, &overflow)
                    .await?;
                tracing::info!(%primary, %overflow, "primary identity provider is full, using overflow");
                Ok(overflow)
            }
            Err(err) => Err(err),
        }
    }

    async fn user_limit_test(&self, user_limit_key: &str, identity_provider: &str) -> MaxResult<()> {
        let Some(user_limit) = self.cache.get_int(user_limit_key).await? else {
            return Ok(());
        };

        let timeslot_key = format!("max:limiter:{identity_provider}:{}", Utc::now().timestamp());
        let count = self.cache.incr(&timeslot_key).await?;
        self.cache.expire(&timeslot_key, USER_LIMIT_WINDOW).await?;

        if count > user_limit {
            return Err(MaxError::TooBusy);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use max_cache::MemoryCache;

    fn limiter(max_count: i64) -> (Arc<dyn Cache>, RateLimiter) {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
        let config = RateLimiterSection {
            ipaddress_max_count: max_count,
            ..RateLimiterSection::default()
        };
        (Arc::clone(&cache), RateLimiter::new(cache, config))
    }

    #[tokio::test]
    async fn outage_flag_blocks() {
        let (cache, limiter) = limiter(10);
        limiter.validate_outage().await.unwrap();

        cache.set("identity_provider_outage", "true").await.unwrap();
        assert!(matches!(
            limiter.validate_outage().await,
            Err(MaxError::DependentServiceOutage)
        ));

        cache.set("identity_provider_outage", "0").await.unwrap();
        limiter.validate_outage().await.unwrap();
    }

    #[tokio::test]
    async fn ip_limit_counts_per_address() {
        let (_, limiter) = limiter(2);
        limiter.ip_limit_test("10.0.0.1").await.unwrap();
        limiter.ip_limit_test("10.0.0.1").await.unwrap();
        limiter.ip_limit_test("10.0.0.2").await.unwrap();

        assert!(matches!(
            limiter.ip_limit_test("10.0.0.1").await,
            Err(MaxError::TooManyRequestsFromOrigin(10))
        ));
    }

    #[tokio::test]
    async fn primary_without_limit_is_used() {
        let (cache, limiter) = limiter(10);
        cache.set("primary_identity_provider", "digid").await.unwrap();
        assert_eq!(
            limiter
                .get_identity_provider_name_and_validate_request("10.0.0.1")
                .await
                .unwrap(),
            "digid"
        );
    }

    #[tokio::test]
    async fn missing_primary_is_an_error() {
        let (_, limiter) = limiter(10);
        assert!(matches!(
            limiter.select_identity_provider().await,
            Err(MaxError::ExpectedCacheValue(key)) if key == "primary_identity_provider"
        ));
    }

    #[tokio::test]
    async fn full_primary_spills_to_overflow() {
        let (cache, limiter) = limiter(10);
        cache.set("primary_identity_provider", "digid").await.unwrap();
        cache.set("primary_identity_provider_user_limit", "0").await.unwrap();
        cache.set("overflow_identity_provider", "tvs").await.unwrap();

        assert_eq!(limiter.select_identity_provider().await.unwrap(), "tvs");

        cache.set("overflow_identity_provider_user_limit", "0").await.unwrap();
        assert!(matches!(
            limiter.select_identity_provider().await,
            Err(MaxError::TooBusy)
        ));
    }

    #[tokio::test]
    async fn full_primary_without_overflow_is_too_busy() {
        let (cache, limiter) = limiter(10);
        cache.set("primary_identity_provider", "digid").await.unwrap();
        cache.set("primary_identity_provider_user_limit", "0").await.unwrap();

        assert!(matches!(
            limiter.select_identity_provider().await,
            Err(MaxError::TooBusy)
        ));
        assert!(matches!(
            limiter
                .get_identity_provider_name_and_validate_request("10.0.0.1")
                .await,
            Err(MaxError::TooBusy)
        ));
    }
}
