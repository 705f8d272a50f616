//! Discovery, key set and request validation.

use serde_json::Value;

use crate::common::{CLIENT_ID, TestEnv};

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let health: Value = env.client.get(env.url("/health")).send().await?.json().await?;
    assert_eq!(health["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_discovery_document() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .client
        .get(env.url("/.well-known/openid-configuration"))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let discovery: Value = response.json().await?;

    let issuer = discovery["issuer"].as_str().expect("issuer");
    assert!(issuer.starts_with("https://"));
    assert_eq!(
        discovery["authorization_endpoint"],
        format!("{issuer}/authorize")
    );
    assert_eq!(discovery["token_endpoint"], format!("{issuer}/token"));
    assert_eq!(discovery["jwks_uri"], format!("{issuer}/jwks"));
    assert!(
        discovery["code_challenge_methods_supported"]
            .as_array()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    );
    Ok(())
}

#[tokio::test]
async fn test_jwks() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let jwks: Value = env.client.get(env.url("/jwks")).send().await?.json().await?;
    let keys = jwks["keys"].as_array().expect("keys");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["alg"], "RS256");
    Ok(())
}

#[tokio::test]
async fn test_unknown_client_is_not_redirected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.authorize(&[("client_id", "intruder")]).await?;
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await?;
    assert_eq!(error["error"], "invalid_client");
    Ok(())
}

#[tokio::test]
async fn test_unregistered_redirect_uri_is_not_redirected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .authorize(&[("redirect_uri", "https://attacker.example/steal")])
        .await?;
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await?;
    assert_eq!(error["error"], "invalid_redirect_uri");
    Ok(())
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .client
        .get(env.url("/authorize"))
        .query(&[("client_id", CLIENT_ID)])
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await?;
    assert_eq!(error["error"], "invalid_request");

    let response = env
        .client
        .post(env.url("/token"))
        .form(&[("grant_type", "authorization_code")])
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}
