//! The configured SAML identity providers, by name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use max_core::config::SamlSection;
use max_protocol_saml::{SamlIdentityProvider, SamlResult};

use crate::error::{MaxError, MaxResult};

/// Identity providers loaded at startup.
#[derive(Default)]
pub struct IdentityProviders {
    providers: HashMap<String, Arc<SamlIdentityProvider>>,
}

impl IdentityProviders {
    /// Loads `{identity_provider_base_path}/{name}/settings.json` for every
    /// configured name. Relative paths are taken from `root`.
    ///
    /// # Errors
    ///
    /// Fails on the first identity provider that cannot be loaded.
    pub fn load(config: &SamlSection, root: &Path) -> SamlResult<Self> {
        let base = root.join(&config.identity_provider_base_path);
        let mut providers = Self::default();
        for name in &config.identity_providers {
            let settings = base.join(name).join("settings.json");
            let provider = SamlIdentityProvider::from_settings_file(name, &settings, root)?;
            providers.insert(provider);
        }
        Ok(providers)
    }

    /// Adds or replaces a provider.
    pub fn insert(&mut self, provider: SamlIdentityProvider) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    /// Whether a provider with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// The provider called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MaxError::UnknownIdentityProvider`] for unknown names.
    pub fn get(&self, name: &str) -> MaxResult<Arc<SamlIdentityProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| MaxError::UnknownIdentityProvider(name.to_string()))
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn testdata() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata")
    }

    fn write_settings(root: &Path, name: &str) {
        let dir = root.join("saml").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let settings = serde_json::json!({
            "saml_specification_version": "4.5",
            "sp_settings": {
                "entity_id": format!("https://sp.example.com/{name}"),
                "cert_path": "sp.crt",
                "key_path": "sp.key",
                "assertion_consumer_service_url": "https://sp.example.com/acs"
            },
            "idp_settings": {
                "metadata_path": "idp_metadata.xml",
                "authn_binding": "POST"
            }
        });
        std::fs::write(dir.join("settings.json"), settings.to_string()).unwrap();
    }

    #[test]
    fn loads_configured_providers() {
        let root = tempfile::tempdir().unwrap();
        for file in ["sp.crt", "sp.key", "idp_metadata.xml"] {
            std::fs::copy(testdata().join(file), root.path().join(file)).unwrap();
        }
        write_settings(root.path(), "tvs");
        write_settings(root.path(), "digid");

        let config = SamlSection {
            identity_providers: vec!["tvs".to_string(), "digid".to_string()],
            ..SamlSection::default()
        };
        let providers = IdentityProviders::load(&config, root.path()).unwrap();

        assert_eq!(providers.len(), 2);
        assert!(providers.contains("digid"));
        assert_eq!(providers.get("tvs").unwrap().name(), "tvs");
        assert!(matches!(
            providers.get("eherkenning"),
            Err(MaxError::UnknownIdentityProvider(name)) if name == "eherkenning"
        ));
    }

    #[test]
    fn missing_settings_fail() {
        let root = tempfile::tempdir().unwrap();
        let config = SamlSection::default();
        assert!(IdentityProviders::load(&config, root.path()).is_err());
        assert!(IdentityProviders::default().is_empty());
    }
}
