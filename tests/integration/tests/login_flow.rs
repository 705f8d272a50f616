//! Complete logins through the DigiD mock.

use serde::Deserialize;

use crate::common::{
    CLIENT_ID, MOCK_BSN, REDIRECT_URI, TestEnv, jwt_claims, location, query_param,
};

/// Token response from the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub id_token: String,
}

/// Error response.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

#[tokio::test]
async fn test_code_flow_with_mock_digid() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let callback = env.login().await?;
    assert!(callback.as_str().starts_with(REDIRECT_URI));
    assert_eq!(query_param(&callback, "state").as_deref(), Some("af0ifjsldkj"));
    let code = query_param(&callback, "code").expect("code in callback");

    let response = env.token(&code).await?;
    assert_eq!(response.status(), 200);
    let token: TokenResponse = response.json().await?;
    assert_eq!(token.token_type.to_lowercase(), "bearer");
    assert!(token.expires_in > 0);

    let id_token = jwt_claims(&token.id_token)?;
    assert_eq!(id_token["aud"], CLIENT_ID);
    assert_eq!(id_token["nonce"], "n-0S6_WzA2Mj");

    let response = env
        .client
        .get(env.url("/userinfo"))
        .bearer_auth(&token.access_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/jwt"
    );
    let userinfo = jwt_claims(&response.text().await?)?;
    assert_eq!(userinfo["bsn"], MOCK_BSN);
    assert_eq!(userinfo["sub"], id_token["sub"]);
    assert_eq!(userinfo["authentication_method"], "digid");
    assert_eq!(userinfo["identity_provider"], "tvs");

    Ok(())
}

#[tokio::test]
async fn test_code_can_be_used_once() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let callback = env.login().await?;
    let code = query_param(&callback, "code").expect("code in callback");

    assert_eq!(env.token(&code).await?.status(), 200);

    let response = env.token(&code).await?;
    assert_eq!(response.status(), 400);
    let error: ErrorResponse = response.json().await?;
    assert_eq!(error.error, "invalid_request");
    assert_eq!(
        error.error_description.as_deref(),
        Some("Code challenge has expired. Please retry authorization.")
    );
    Ok(())
}

#[tokio::test]
async fn test_userinfo_requires_valid_token() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.post(env.url("/userinfo")).send().await?;
    assert_eq!(response.status(), 401);
    let error: ErrorResponse = response.json().await?;
    assert_eq!(error.error, "invalid_token");

    let response = env
        .client
        .get(env.url("/userinfo"))
        .bearer_auth("unknown-token")
        .send()
        .await?;
    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_legacy_mode_userinfo_with_id_token() -> anyhow::Result<()> {
    let mut config = max_core::MaxConfig::for_testing();
    config.app.app_mode = "legacy".to_string();
    let env = TestEnv::with_config(config).await?;

    let callback = env.login().await?;
    let code = query_param(&callback, "code").expect("code in callback");
    let token: TokenResponse = env.token(&code).await?.json().await?;

    let response = env
        .client
        .get(env.url("/userinfo"))
        .bearer_auth(&token.id_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(jwt_claims(&response.text().await?)?["bsn"], MOCK_BSN);
    Ok(())
}

#[tokio::test]
async fn test_acs_without_login_state() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .client
        .get(env.url("/acs"))
        .query(&[("SAMLart", MOCK_BSN), ("RelayState", "unknown"), ("mocking", "1")])
        .send()
        .await?;
    assert_eq!(response.status(), 403);
    let error: ErrorResponse = response.json().await?;
    assert_eq!(error.error, "unauthorized");
    Ok(())
}

#[tokio::test]
async fn test_login_options_for_multiple_methods() -> anyhow::Result<()> {
    let mut config = max_core::MaxConfig::for_testing();
    config.app.login_methods = vec!["digid".to_string(), "tvs".to_string()];
    let env = TestEnv::with_config(config).await?;

    let response = env.authorize(&[]).await?;
    assert_eq!(response.status(), 200);
    let page = response.text().await?;
    assert!(page.contains("Test Client"));
    assert!(page.contains("login_hints=digid"));
    assert!(page.contains("login_hints=tvs"));

    // A hint narrows the choice to a single method.
    let response = env.authorize(&[("login_hints", "tvs")]).await?;
    assert_eq!(response.status(), 200);
    assert!(response.text().await?.contains("SAMLRequest"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_request_redirects_to_client() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.authorize(&[("response_type", "token")]).await?;
    let redirect = url::Url::parse(&location(&response)?)?;
    assert!(redirect.as_str().starts_with(REDIRECT_URI));
    assert_eq!(
        query_param(&redirect, "error").as_deref(),
        Some("unsupported_response_type")
    );
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("af0ifjsldkj"));
    Ok(())
}
