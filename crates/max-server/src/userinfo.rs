//! Userinfo handed to clients after a successful login.

use std::sync::Arc;

use max_protocol_oidc::TokenSigner;
use serde::{Deserialize, Serialize};

use crate::error::MaxResult;

/// Claims of the userinfo JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserinfoClaims {
    /// Issuer.
    pub iss: String,
    /// Client the userinfo is meant for.
    pub aud: String,
    /// Pairwise subject, equal to the id token `sub`.
    pub sub: String,
    /// Issued at.
    pub iat: i64,
    /// Expiry.
    pub exp: i64,
    /// Burgerservicenummer of the user.
    pub bsn: String,
    /// Login method used.
    pub authentication_method: String,
    /// Identity provider that authenticated the user.
    pub identity_provider: String,
}

/// Creates signed userinfo.
pub struct UserinfoService {
    signer: Arc<TokenSigner>,
}

impl UserinfoService {
    /// Creates the service.
    #[must_use]
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self { signer }
    }

    /// Signed userinfo JWT for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an error when signing fails.
    pub fn create_userinfo(
        &self,
        client_id: &str,
        subject: &str,
        bsn: &str,
        authentication_method: &str,
        identity_provider: &str,
    ) -> MaxResult<String> {
        let (iat, exp) = self.signer.validity();
        let claims = UserinfoClaims {
            iss: self.signer.issuer().to_string(),
            aud: client_id.to_string(),
            sub: subject.to_string(),
            iat,
            exp,
            bsn: bsn.to_string(),
            authentication_method: authentication_method.to_string(),
            identity_provider: identity_provider.to_string(),
        };
        Ok(self.signer.sign(&claims)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn userinfo_is_signed_with_provider_key() {
        let signer = Arc::new(
            TokenSigner::new(
                include_str!("../../../testdata/oidc.key"),
                "https://localhost:8006",
                Duration::from_secs(600),
                None,
            )
            .unwrap(),
        );
        let service = UserinfoService::new(Arc::clone(&signer));
        let jwt = service
            .create_userinfo("test_client", "sub", "999991772", "digid", "tvs")
            .unwrap();

        let claims: UserinfoClaims = signer.verify(&jwt).unwrap();
        assert_eq!(claims.bsn, "999991772");
        assert_eq!(claims.aud, "test_client");
        assert_eq!(claims.iss, "https://localhost:8006");
        assert_eq!(claims.identity_provider, "tvs");
        assert!(claims.exp > claims.iat);
    }
}
