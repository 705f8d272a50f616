//! # max-protocol-saml
//!
//! SAML 2.0 service provider side of the MAX identity gateway.
//!
//! MAX sends an `AuthnRequest` to DigiD or TVS through the POST or Redirect
//! binding, receives an artifact on its assertion consumer service and
//! resolves it over the SOAP back channel.
//!
//! ## Modules
//!
//! - [`artifact`] - `ArtifactResolve` requests and `ArtifactResponse` parsing
//! - [`authn_request`] - `AuthnRequest` generation
//! - [`bindings`] - HTTP-Redirect and HTTP-POST encoding
//! - [`constants`] - Namespaces, bindings and scoping URNs
//! - [`error`] - SAML error types
//! - [`identity_provider`] - A configured identity provider
//! - [`metadata`] - Identity provider metadata
//! - [`settings`] - Per identity provider `settings.json`
//! - [`signature`] - Enveloped XML signatures and redirect query signing
//! - [`signature_validator`] - Verification of identity provider signatures

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod artifact;
pub mod authn_request;
pub mod bindings;
pub mod constants;
pub mod error;
pub mod identity_provider;
pub mod metadata;
pub mod settings;
pub mod signature;
pub mod signature_validator;
mod xml;

pub use artifact::{ArtifactResolveRequest, ArtifactResponse};
pub use authn_request::AuthnRequest;
pub use bindings::{HttpPostBinding, HttpRedirectBinding};
pub use constants::SamlBinding;
pub use error::{SamlError, SamlResult};
pub use identity_provider::SamlIdentityProvider;
pub use metadata::IdpMetadata;
pub use settings::{SamlSettings, SpecVersion};
pub use signature::XmlSigner;
pub use signature_validator::XmlSignatureValidator;
