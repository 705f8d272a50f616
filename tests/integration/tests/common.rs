//! Common test utilities and fixtures.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use max_cache::{Cache, MemoryCache};
use max_core::MaxConfig;
use max_protocol_oidc::PkceVerifier;
use max_server::Server;
use reqwest::{Client, Response, redirect};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::sleep;

pub const CLIENT_ID: &str = "test_client";
pub const REDIRECT_URI: &str = "https://client.example/login";
pub const ERROR_PAGE: &str = "https://client.example/error";
pub const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const MOCK_BSN: &str = "999991772";

/// Test environment running a server on a random port.
pub struct TestEnv {
    /// Base URL of the running server.
    pub base_url: String,
    /// HTTP client that does not follow redirects.
    pub client: Client,
    /// Cache shared with the server.
    pub cache: Arc<dyn Cache>,
    /// Configuration directory.
    _root: TempDir,
    /// Server shutdown signal.
    _shutdown_tx: oneshot::Sender<()>,
}

impl TestEnv {
    /// Starts a server backed by an in-memory cache.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(MaxConfig::for_testing()).await
    }

    /// Starts a server with `config`, an in-memory cache and the test fixtures.
    pub async fn with_config(config: MaxConfig) -> anyhow::Result<Self> {
        Self::start(config, Arc::new(MemoryCache::default())).await
    }

    /// Starts a server with `config` and `cache`.
    pub async fn start(config: MaxConfig, cache: Arc<dyn Cache>) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("max_server=debug,tower_http=info")
            .with_test_writer()
            .try_init();

        let root = tempfile::tempdir()?;
        write_fixtures(root.path(), &config)?;

        cache
            .set(&config.ratelimiter.primary_identity_provider_key, "tvs")
            .await?;

        let server = Server::with_cache(config, root.path(), Arc::clone(&cache))?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let (_shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown requested");
            };
            if let Err(e) = server.serve(listener, shutdown).await {
                tracing::error!("Server error: {}", e);
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .build()?;

        wait_for_server(&client, &base_url).await?;

        Ok(Self {
            base_url,
            client,
            cache,
            _root: root,
            _shutdown_tx,
        })
    }

    /// Absolute URL for a server path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends an authorize request for the test client with extra parameters.
    pub async fn authorize(&self, extra: &[(&str, &str)]) -> anyhow::Result<Response> {
        let challenge = PkceVerifier::challenge(CODE_VERIFIER);
        let mut query = vec![
            ("client_id", CLIENT_ID),
            ("redirect_uri", REDIRECT_URI),
            ("response_type", "code"),
            ("nonce", "n-0S6_WzA2Mj"),
            ("scope", "openid"),
            ("state", "af0ifjsldkj"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ];
        for &(name, value) in extra {
            query.retain(|&(existing, _)| existing != name);
            query.push((name, value));
        }
        Ok(self
            .client
            .get(self.url("/authorize"))
            .query(&query)
            .send()
            .await?)
    }

    /// Runs a full mock login and returns the URL the client receives.
    pub async fn login(&self) -> anyhow::Result<url::Url> {
        let response = self.authorize(&[]).await?;
        anyhow::ensure!(response.status() == 200, "authorize returned {}", response.status());
        let form = response.text().await?;

        let action = attribute(&form, "action").ok_or_else(|| anyhow::anyhow!("no form action"))?;
        let saml_request = input_value(&form, "SAMLRequest")
            .ok_or_else(|| anyhow::anyhow!("no SAMLRequest"))?;
        let relay_state =
            input_value(&form, "RelayState").ok_or_else(|| anyhow::anyhow!("no RelayState"))?;

        let mock_page = self
            .client
            .post(self.url(&action))
            .form(&[("SAMLRequest", saml_request), ("RelayState", relay_state.clone())])
            .send()
            .await?;
        anyhow::ensure!(mock_page.status() == 200, "mock page returned {}", mock_page.status());
        let page = mock_page.text().await?;
        let state = input_value(&page, "state").ok_or_else(|| anyhow::anyhow!("no state"))?;
        anyhow::ensure!(state == relay_state, "mock page lost the relay state");

        let catch = self
            .client
            .get(self.url("/digid-mock-catch"))
            .query(&[("bsn", MOCK_BSN), ("state", state.as_str())])
            .send()
            .await?;
        let acs = location(&catch)?;

        let done = self.client.get(self.url(&acs)).send().await?;
        anyhow::ensure!(done.status() == 307, "acs returned {}", done.status());
        Ok(url::Url::parse(&location(&done)?)?)
    }

    /// Exchanges a code at the token endpoint.
    pub async fn token(&self, code: &str) -> anyhow::Result<Response> {
        Ok(self
            .client
            .post(self.url("/token"))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", CODE_VERIFIER),
                ("client_id", CLIENT_ID),
            ])
            .send()
            .await?)
    }
}

/// Writes clients, keys and one identity provider (`tvs`) under `root`.
fn write_fixtures(root: &Path, config: &MaxConfig) -> anyhow::Result<()> {
    let clients = serde_json::json!({
        CLIENT_ID: {
            "name": "Test Client",
            "redirect_uris": [REDIRECT_URI],
            "error_page": ERROR_PAGE
        }
    });
    write(root, &config.oidc.clients_file, &clients.to_string())?;

    let testdata = testdata();
    write(
        root,
        &config.oidc.rsa_private_key,
        &std::fs::read_to_string(testdata.join("oidc.key"))?,
    )?;
    for file in ["sp.crt", "sp.key", "idp_metadata.xml"] {
        std::fs::copy(testdata.join(file), root.join(file))?;
    }

    let settings = serde_json::json!({
        "saml_specification_version": "4.5",
        "sp_settings": {
            "entity_id": "https://max.example/tvs",
            "cert_path": "sp.crt",
            "key_path": "sp.key",
            "assertion_consumer_service_url": "https://max.example/acs"
        },
        "idp_settings": {
            "metadata_path": "idp_metadata.xml",
            "authn_binding": "POST"
        },
        "security": {"allowScoping": true, "authnRequestsSigned": true}
    });
    for name in &config.saml.identity_providers {
        write(
            root,
            &format!("{}/{name}/settings.json", config.saml.identity_provider_base_path),
            &settings.to_string(),
        )?;
    }
    Ok(())
}

fn write(root: &Path, relative: &str, contents: &str) -> anyhow::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

fn testdata() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata")
}

/// Waits for the server to answer its health check.
async fn wait_for_server(client: &Client, base_url: &str) -> anyhow::Result<()> {
    for _ in 0..50 {
        if let Ok(response) = client.get(format!("{base_url}/health")).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("server did not become ready")
}

/// The `Location` header of a redirect.
pub fn location(response: &Response) -> anyhow::Result<String> {
    anyhow::ensure!(
        response.status().is_redirection(),
        "expected a redirect, got {}",
        response.status()
    );
    Ok(response
        .headers()
        .get(reqwest::header::LOCATION)
        .ok_or_else(|| anyhow::anyhow!("redirect without location"))?
        .to_str()?
        .to_string())
}

/// A query parameter of `url`.
pub fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Claims of a JWT, without checking the signature.
pub fn jwt_claims(jwt: &str) -> anyhow::Result<serde_json::Value> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("not a JWT"))?;
    Ok(serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?)
}

fn attribute(html: &str, name: &str) -> Option<String> {
    let marker = format!("{name}=\"");
    let start = html.find(&marker)? + marker.len();
    let end = html[start..].find('"')? + start;
    Some(unescape_html(&html[start..end]))
}

fn input_value(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"");
    let start = html.find(&marker)?;
    attribute(&html[start..], "value")
}

fn unescape_html(value: &str) -> String {
    value
        .replace("&#x2f;", "/")
        .replace("&#x2F;", "/")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
