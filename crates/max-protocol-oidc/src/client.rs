//! Registered OIDC clients.
//!
//! Clients are read from `clients.json`, a JSON object keyed by client id:
//!
//! ```json
//! {
//!   "test_client": {
//!     "name": "Test Client",
//!     "redirect_uris": ["http://localhost:3000/login"],
//!     "error_page": "http://localhost:3000/error",
//!     "response_types": ["code"],
//!     "token_endpoint_auth_method": "none"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OidcError, OidcResult};

/// A registered public client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Display name, shown on the login options page.
    #[serde(default)]
    pub name: String,
    /// Allowed redirect URIs; matched exactly.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Page users are sent to when no redirect back to the client is possible.
    #[serde(default)]
    pub error_page: Option<String>,
    /// Allowed response types.
    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,
    /// Token endpoint authentication; only `none` is supported.
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: String,
}

fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

fn default_auth_method() -> String {
    "none".to_string()
}

impl Client {
    /// Whether `redirect_uri` is registered for this client.
    #[must_use]
    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

/// Client registry.
#[derive(Debug, Clone, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Parses the contents of `clients.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a client map.
    pub fn from_json(json: &str) -> OidcResult<Self> {
        let clients: HashMap<String, Client> = serde_json::from_str(json)
            .map_err(|e| OidcError::ServerError(format!("invalid clients file: {e}")))?;
        Ok(Self { clients })
    }

    /// Reads a clients file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> OidcResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            OidcError::ServerError(format!("cannot read {}: {e}", path.display()))
        })?;
        let clients = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), count = clients.len(), "loaded clients");
        Ok(clients)
    }

    /// Looks up a client.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Looks up a client, failing with `invalid_client`.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::InvalidClient`] when the client is unknown.
    pub fn require(&self, client_id: &str) -> OidcResult<&Client> {
        self.get(client_id).ok_or_else(|| {
            OidcError::InvalidClient(format!(
                "Client id {client_id} is not known for this OIDC server"
            ))
        })
    }

    /// Adds or replaces a client.
    pub fn insert(&mut self, client_id: impl Into<String>, client: Client) {
        self.clients.insert(client_id.into(), client);
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CLIENTS: &str = r#"{
        "test_client": {
            "name": "Test Client",
            "redirect_uris": ["http://localhost:3000/login"],
            "error_page": "http://localhost:3000/error"
        },
        "bare": {}
    }"#;

    #[test]
    fn parses_clients_with_defaults() {
        let clients = Clients::from_json(CLIENTS).unwrap();
        assert_eq!(clients.len(), 2);

        let client = clients.get("test_client").unwrap();
        assert_eq!(client.name, "Test Client");
        assert_eq!(client.response_types, vec!["code"]);
        assert_eq!(client.token_endpoint_auth_method, "none");
        assert!(client.allows_redirect_uri("http://localhost:3000/login"));
        assert!(!client.allows_redirect_uri("http://localhost:3000/login/"));

        let bare = clients.get("bare").unwrap();
        assert!(bare.redirect_uris.is_empty());
        assert!(bare.error_page.is_none());
    }

    #[test]
    fn unknown_client_is_invalid_client() {
        let clients = Clients::from_json(CLIENTS).unwrap();
        let err = clients.require("nope").unwrap_err();
        assert_eq!(err.error_code(), "invalid_client");
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn rejects_malformed_file() {
        assert!(Clients::from_json("[]").is_err());
    }
}
