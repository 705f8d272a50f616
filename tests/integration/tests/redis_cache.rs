//! Logins backed by a real Redis.
//!
//! These tests start a Redis container and are ignored by default.

use std::sync::Arc;
use std::time::Duration;

use max_cache::Cache;
use max_cache_redis::{RedisCache, RedisConfig};
use max_core::MaxConfig;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::{REDIS_PORT, Redis};

use crate::common::{MOCK_BSN, TestEnv, jwt_claims, query_param};

async fn redis_cache(
    port: u16,
    namespace: &str,
) -> anyhow::Result<Arc<RedisCache>> {
    let config = RedisConfig::new()
        .host("127.0.0.1")
        .port(port)
        .key_prefix(namespace)
        .object_ttl_secs(60);
    Ok(Arc::new(RedisCache::new(config).await?))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cache_operations() -> anyhow::Result<()> {
    let redis = Redis::default().start().await?;
    let port = redis.get_host_port_ipv4(REDIS_PORT).await?;
    let cache = redis_cache(port, "max-test").await?;

    cache.set("greeting", "hello").await?;
    assert_eq!(cache.get_string("greeting").await?.as_deref(), Some("hello"));
    assert_eq!(cache.get_del("greeting").await?.as_deref(), Some("hello"));
    assert_eq!(cache.get_string("greeting").await?, None);

    assert_eq!(cache.incr("counter").await?, 1);
    assert_eq!(cache.incr("counter").await?, 2);
    cache.expire("counter", Duration::from_secs(1)).await?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cache.get_int("counter").await?, None);

    cache.set("flag", "1").await?;
    assert!(cache.get_bool("flag").await?);
    assert!(!cache.get_bool("missing").await?);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_login_with_redis_and_sealed_state() -> anyhow::Result<()> {
    let redis = Redis::default().start().await?;
    let port = redis.get_host_port_ipv4(REDIS_PORT).await?;

    let mut config = MaxConfig::for_testing();
    config.redis.encryption_key = Some("0f".repeat(32));
    let cache = redis_cache(port, "max-login").await?;
    let env = TestEnv::start(config, cache).await?;

    let callback = env.login().await?;
    let code = query_param(&callback, "code").expect("code in callback");
    let token: serde_json::Value = env.token(&code).await?.json().await?;
    let access_token = token["access_token"].as_str().expect("access token");

    let response = env
        .client
        .get(env.url("/userinfo"))
        .bearer_auth(access_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(jwt_claims(&response.text().await?)?["bsn"], MOCK_BSN);
    Ok(())
}
