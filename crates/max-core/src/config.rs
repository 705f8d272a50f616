//! `max.conf` configuration.
//!
//! The file is TOML. Any value can be overridden from the environment with a
//! variable named `MAX__<SECTION>__<KEY>`, e.g. `MAX__REDIS__HOST=redis`.
//! A `.env` file is honoured when present.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "MAX__";

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "MAX_CONFIG";

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "max.conf";

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxConfig {
    /// Application behaviour.
    pub app: AppConfig,
    /// HTTP listener.
    pub server: ServerSection,
    /// Redis connection and cache behaviour.
    pub redis: RedisSection,
    /// OIDC provider.
    pub oidc: OidcSection,
    /// SAML identity providers.
    pub saml: SamlSection,
    /// Rate limiter keys and thresholds.
    pub ratelimiter: RateLimiterSection,
}

/// `[app]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level name (`debug`, `info`, `warning`, ...).
    pub loglevel: String,
    /// Replace the SAML round trip with the built-in DigiD mock.
    pub mock_digid: bool,
    /// Deployment environment name.
    pub environment: String,
    /// `legacy` keys userinfo by the id token `at_hash`.
    pub app_mode: String,
    /// Login methods offered to users, in display order.
    pub login_methods: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            mock_digid: false,
            environment: "development".to_string(),
            app_mode: String::new(),
            login_methods: vec!["digid".to_string()],
        }
    }
}

/// `[server]` section.
///
/// The listener speaks plain HTTP; TLS is terminated by the reverse proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8006,
        }
    }
}

/// `[redis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Connect with TLS.
    pub ssl: bool,
    /// Password.
    pub password: Option<String>,
    /// Database number.
    pub database: u8,
    /// Namespace prepended to every key.
    pub default_cache_namespace: String,
    /// Time to live of stored objects in seconds.
    pub object_ttl: u64,
    /// Track keys that expire without being read.
    pub enable_debugger: bool,
    /// Hex encoded AES-256 key. When set, cached authentication contexts
    /// (which carry the BSN) are sealed before they are stored.
    pub encryption_key: Option<String>,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            ssl: false,
            password: None,
            database: 0,
            default_cache_namespace: "max".to_string(),
            object_ttl: 600,
            enable_debugger: false,
            encryption_key: None,
        }
    }
}

/// `[oidc]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcSection {
    /// Issuer host, without scheme.
    pub issuer: String,
    /// Path of the authorize endpoint.
    pub authorize_endpoint: String,
    /// Path of the token endpoint.
    pub token_endpoint: String,
    /// Path of the userinfo endpoint.
    pub userinfo_endpoint: String,
    /// Path of the JWKS endpoint.
    pub jwks_endpoint: String,
    /// Registered clients file.
    pub clients_file: String,
    /// PEM encoded RSA signing key.
    pub rsa_private_key: String,
    /// Salt for pairwise subject identifiers.
    pub subject_id_hash_salt: String,
    /// Lifetime of id tokens and access tokens in seconds.
    pub id_token_lifetime: u64,
    /// Key id advertised in the JWKS; derived from the key when unset.
    pub kid: Option<String>,
}

impl Default for OidcSection {
    fn default() -> Self {
        Self {
            issuer: "localhost:8006".to_string(),
            authorize_endpoint: "/authorize".to_string(),
            token_endpoint: "/token".to_string(),
            userinfo_endpoint: "/userinfo".to_string(),
            jwks_endpoint: "/jwks".to_string(),
            clients_file: "clients.json".to_string(),
            rsa_private_key: "secrets/oidc.key".to_string(),
            subject_id_hash_salt: "somesalt".to_string(),
            id_token_lifetime: 600,
            kid: None,
        }
    }
}

/// `[saml]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlSection {
    /// Base host used to build per-provider issuers.
    pub base_issuer: String,
    /// Directory holding one sub-directory per identity provider.
    pub identity_provider_base_path: String,
    /// Names of the identity providers to load.
    pub identity_providers: Vec<String>,
}

impl Default for SamlSection {
    fn default() -> Self {
        Self {
            base_issuer: "localhost:8006".to_string(),
            identity_provider_base_path: "saml".to_string(),
            identity_providers: vec!["tvs".to_string()],
        }
    }
}

/// `[ratelimiter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSection {
    /// Cache key that signals an identity provider outage.
    pub identity_provider_outage_key: Option<String>,
    /// Cache key holding the primary identity provider name.
    pub primary_identity_provider_key: String,
    /// Cache key holding the overflow identity provider name.
    pub overflow_identity_provider_key: String,
    /// Cache key holding the per second user limit of the primary provider.
    pub primary_identity_provider_user_limit_key: String,
    /// Cache key holding the per second user limit of the overflow provider.
    pub overflow_identity_provider_user_limit_key: String,
    /// Maximum requests per address within the window.
    pub ipaddress_max_count: i64,
    /// Window length in seconds.
    pub ipaddress_max_count_expire_seconds: u64,
}

impl Default for RateLimiterSection {
    fn default() -> Self {
        Self {
            identity_provider_outage_key: Some("identity_provider_outage".to_string()),
            primary_identity_provider_key: "primary_identity_provider".to_string(),
            overflow_identity_provider_key: "overflow_identity_provider".to_string(),
            primary_identity_provider_user_limit_key: "primary_identity_provider_user_limit"
                .to_string(),
            overflow_identity_provider_user_limit_key: "overflow_identity_provider_user_limit"
                .to_string(),
            ipaddress_max_count: 10,
            ipaddress_max_count_expire_seconds: 10,
        }
    }
}

impl MaxConfig {
    /// Loads and validates the configuration file, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or when
    /// validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_dotenv();
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, &path.display().to_string(), std::env::vars())
    }

    /// Loads the file named by `MAX_CONFIG`, falling back to `max.conf`.
    ///
    /// # Errors
    ///
    /// See [`MaxConfig::load`].
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Parses TOML contents, applies overrides from `vars` and validates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed TOML or values of the wrong
    /// type, and validation errors from [`MaxConfig::validate`].
    pub fn parse<I>(contents: &str, origin: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let parse_error = |message: String| Error::Parse {
            path: origin.to_string(),
            message,
        };

        let mut table: toml::Table = toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?;
        apply_env_overrides(&mut table, vars);

        let config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Fails on an unknown log level or when the DigiD mock is enabled in a
    /// production environment.
    pub fn validate(&self) -> Result<()> {
        self.tracing_level()?;
        if self.app.mock_digid && self.app.environment.starts_with("prod") {
            return Err(Error::MockDigidInProduction(self.app.environment.clone()));
        }
        if self.app.login_methods.is_empty() {
            return Err(Error::Config("app.login_methods must not be empty".to_string()));
        }
        Ok(())
    }

    /// Normalised tracing filter directive for `app.loglevel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLogLevel`] for unknown names.
    pub fn tracing_level(&self) -> Result<&'static str> {
        match self.app.loglevel.to_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" | "critical" => Ok("error"),
            _ => Err(Error::InvalidLogLevel(self.app.loglevel.to_uppercase())),
        }
    }

    /// Whether userinfo is keyed by the id token `at_hash`.
    #[must_use]
    pub fn is_legacy_mode(&self) -> bool {
        self.app.app_mode == "legacy"
    }

    /// Issuer URL including scheme.
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!("https://{}", self.oidc.issuer)
    }

    /// Creates a configuration for testing with the DigiD mock enabled.
    #[must_use]
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.app.loglevel = "debug".to_string();
        config.app.mock_digid = true;
        config.app.environment = "test".to_string();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.redis.object_ttl = 60;
        config.ratelimiter.ipaddress_max_count = 100;
        config
    }
}

/// Reads `.env` when present. A missing file is normal; anything else is
/// logged and otherwise ignored.
fn load_dotenv() {
    if let Some(err) = dotenv_problem(dotenvy::dotenv()) {
        tracing::warn!(error = %err, "ignoring unreadable .env file");
    }
}

fn dotenv_problem<T>(result: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    match result {
        Err(err) if !err.not_found() => Some(err),
        _ => None,
    }
}

fn apply_env_overrides<I>(table: &mut toml::Table, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let defaults = toml::Value::try_from(MaxConfig::default()).ok();

    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some((section, key)) = rest.split_once("__") else {
            continue;
        };
        let (section, key) = (section.to_lowercase(), key.to_lowercase());

        let entry = table
            .entry(section.clone())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let Some(section_table) = entry.as_table_mut() else {
            tracing::warn!(%section, "ignoring override for non-table section");
            continue;
        };

        let template = section_table.get(&key).or_else(|| {
            defaults
                .as_ref()
                .and_then(|defaults| defaults.get(&section))
                .and_then(|section| section.get(&key))
        });
        let value = override_value(&raw, template);
        section_table.insert(key, value);
    }
}

/// Converts an environment value to the TOML type of `template`, the value
/// from the file or the built-in default. Keys without a template (unset
/// optional fields) are strings. Values that do not parse as the expected
/// type stay strings so deserialization reports the field.
fn override_value(raw: &str, template: Option<&toml::Value>) -> toml::Value {
    let string = || toml::Value::String(raw.to_string());
    match template {
        Some(toml::Value::Array(_)) => toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_string()))
                .collect(),
        ),
        Some(toml::Value::Boolean(_)) => raw
            .trim()
            .to_lowercase()
            .parse::<bool>()
            .map_or_else(|_| string(), toml::Value::Boolean),
        Some(toml::Value::Integer(_)) => raw
            .trim()
            .parse::<i64>()
            .map_or_else(|_| string(), toml::Value::Integer),
        Some(toml::Value::Float(_)) => raw
            .trim()
            .parse::<f64>()
            .map_or_else(|_| string(), toml::Value::Float),
        _ => string(),
    }
}
