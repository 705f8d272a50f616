//! Per identity provider settings, read from `saml/{name}/settings.json`.
//!
//! Relative paths in the file are resolved against the directory MAX runs
//! from, see [`SamlSettings::resolve_paths`].

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::SamlBinding;
use crate::error::{SamlError, SamlResult};

/// Contents of an identity provider's `settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlSettings {
    /// Reject responses that fail signature, destination or audience checks.
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Skip all response validation. Only for local development.
    #[serde(default)]
    pub insecure: bool,
    /// Verify the identity provider's TLS certificate on the back channel.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Version of the Logius SAML specification the identity provider implements.
    pub saml_specification_version: SpecVersion,
    /// Our side.
    pub sp_settings: SpSettings,
    /// Their side.
    pub idp_settings: IdpSettings,
    /// Feature switches.
    #[serde(default)]
    pub security: SecuritySettings,
}

/// Service provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpSettings {
    /// Our entity id, sent as `saml:Issuer`.
    pub entity_id: String,
    /// Our certificate (PEM), also the TLS client certificate.
    pub cert_path: PathBuf,
    /// Our private key (PEM).
    pub key_path: PathBuf,
    /// Where the identity provider sends the artifact.
    #[serde(default)]
    pub assertion_consumer_service_url: Option<String>,
    /// Index of the assertion consumer service in our registered metadata.
    #[serde(default)]
    pub assertion_consumer_service_index: Option<u32>,
    /// Index of the attribute consuming service in our registered metadata.
    #[serde(default)]
    pub attribute_consuming_service_index: Option<u32>,
    /// Human-readable name sent as `ProviderName`.
    #[serde(default)]
    pub provider_name: Option<String>,
    /// Service UUID registered with the identity provider.
    #[serde(default)]
    pub service_uuid: Option<String>,
    /// Expected `Destination` of artifact responses.
    #[serde(default)]
    pub response_destination: Option<String>,
}

/// Identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpSettings {
    /// Path to the identity provider metadata XML.
    pub metadata_path: PathBuf,
    /// Binding used to send the `AuthnRequest`.
    pub authn_binding: String,
}

impl IdpSettings {
    /// The configured binding, if recognised.
    #[must_use]
    pub fn binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_setting(&self.authn_binding)
    }
}

/// Security switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettings {
    /// The identity provider accepts `Scoping` in requests.
    #[serde(default)]
    pub allow_scoping: bool,
    /// Sign `AuthnRequest`s.
    #[serde(default)]
    pub authn_requests_signed: bool,
}

const fn default_true() -> bool {
    true
}

impl SamlSettings {
    /// Parses settings JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Settings`] for malformed or incomplete settings.
    pub fn from_json(json: &str) -> SamlResult<Self> {
        serde_json::from_str(json).map_err(|e| SamlError::Settings(e.to_string()))
    }

    /// Reads a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Settings`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> SamlResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SamlError::Settings(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
            .map_err(|e| SamlError::Settings(format!("{}: {e}", path.display())))
    }

    /// Makes relative key, certificate and metadata paths relative to `root`.
    #[must_use]
    pub fn resolve_paths(mut self, root: &Path) -> Self {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        };
        resolve(&mut self.sp_settings.cert_path);
        resolve(&mut self.sp_settings.key_path);
        resolve(&mut self.idp_settings.metadata_path);
        self
    }
}

/// `major.minor` version of the SAML specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SpecVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl SpecVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Ord for SpecVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl PartialOrd for SpecVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SpecVersion {
    type Err = SamlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SamlError::Settings(format!("invalid saml_specification_version {s}"));
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(part) => part.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl<'de> Deserialize<'de> for SpecVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Number(number) => number.to_string(),
            Raw::Text(text) => text,
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}
