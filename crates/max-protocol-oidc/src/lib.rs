//! # max-protocol-oidc
//!
//! `OpenID` Connect provider building blocks for the MAX identity gateway.
//!
//! MAX is a public-client, authorization code + PKCE only provider. Users
//! authenticate at an external SAML identity provider; this crate covers
//! the OIDC half of the round trip.
//!
//! ## Modules
//!
//! - [`authz_state`] - Authorization codes, access tokens and introspection
//! - [`client`] - Registered clients from `clients.json`
//! - [`discovery`] - `OpenID` Provider Metadata for `.well-known`
//! - [`error`] - OIDC error types following RFC 6749
//! - [`jwks`] - JSON Web Key Set
//! - [`pkce`] - Proof Key for Code Exchange verification
//! - [`request`] - Authorize and token request types
//! - [`token`] - RS256 signing of id tokens and userinfo

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod authz_state;
pub mod client;
pub mod discovery;
pub mod error;
pub mod jwks;
pub mod pkce;
pub mod request;
pub mod token;

pub use authz_state::{AuthorizationState, Introspection};
pub use client::{Client, Clients};
pub use discovery::{Endpoints, ProviderMetadata};
pub use error::{ErrorResponse, OidcError, OidcResult};
pub use jwks::{JsonWebKey, JsonWebKeySet};
pub use pkce::PkceVerifier;
pub use request::{AuthorizeRequest, TokenRequest};
pub use token::{IdTokenClaims, TokenResponse, TokenSigner};
