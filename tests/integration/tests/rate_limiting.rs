//! Rate limiting and outage handling on `/authorize`.

use max_cache::Cache;
use max_core::MaxConfig;

use crate::common::{CLIENT_ID, ERROR_PAGE, REDIRECT_URI, TestEnv, location, query_param};

fn assert_error_page(location: &str) -> anyhow::Result<()> {
    let url = url::Url::parse(location)?;
    assert!(url.as_str().starts_with(ERROR_PAGE), "unexpected redirect {url}");
    assert_eq!(query_param(&url, "redirect_uri").as_deref(), Some(REDIRECT_URI));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some(CLIENT_ID));
    assert_eq!(query_param(&url, "state").as_deref(), Some("af0ifjsldkj"));
    Ok(())
}

#[tokio::test]
async fn test_outage_sends_user_to_error_page() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.cache.set("identity_provider_outage", "true").await?;

    let response = env.authorize(&[]).await?;
    assert_eq!(response.status(), 307);
    assert_error_page(&location(&response)?)?;

    env.cache.delete("identity_provider_outage").await?;
    assert_eq!(env.authorize(&[]).await?.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_requests_per_address_are_limited() -> anyhow::Result<()> {
    let mut config = MaxConfig::for_testing();
    config.ratelimiter.ipaddress_max_count = 2;
    let env = TestEnv::with_config(config).await?;

    assert_eq!(env.authorize(&[]).await?.status(), 200);
    assert_eq!(env.authorize(&[]).await?.status(), 200);

    let response = env.authorize(&[]).await?;
    assert_eq!(response.status(), 307);
    assert_error_page(&location(&response)?)?;
    Ok(())
}

#[tokio::test]
async fn test_full_identity_provider_without_overflow() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.cache
        .set("primary_identity_provider_user_limit", "0")
        .await?;

    let response = env.authorize(&[]).await?;
    assert_eq!(response.status(), 307);
    assert_error_page(&location(&response)?)?;
    Ok(())
}

#[tokio::test]
async fn test_full_identity_provider_uses_overflow() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.cache
        .set("primary_identity_provider_user_limit", "0")
        .await?;
    env.cache.set("overflow_identity_provider", "tvs").await?;

    assert_eq!(env.authorize(&[]).await?.status(), 200);
    Ok(())
}
