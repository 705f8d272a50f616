//! SAML error types.

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// `settings.json` is missing, unreadable or incomplete.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Identity provider metadata is unusable.
    #[error("invalid metadata: {0}")]
    Metadata(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// XML signature is missing or does not verify.
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),

    /// Key or certificate problem.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Scoping was requested from an identity provider that does not allow it.
    #[error("scoping attributes not allowed: {0}")]
    ScopingAttributesNotAllowed(String),

    /// Binding not supported for this operation.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// The identity provider answered with a non-success status.
    #[error("identity provider returned {status}: {message}")]
    StatusNotSuccess {
        /// Most specific status code.
        status: String,
        /// Status message, if any.
        message: String,
    },

    /// The artifact response could not be validated.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Back channel request failed.
    #[error("artifact resolution failed: {0}")]
    ArtifactResolution(String),

    /// External authorization failed; the user may not continue.
    #[error("{0}")]
    Unauthorized(String),
}

impl SamlError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::ScopingAttributesNotAllowed(_) => 400,
            Self::Unauthorized(_)
            | Self::StatusNotSuccess { .. }
            | Self::InvalidResponse(_)
            | Self::SignatureInvalid(_) => 401,
            Self::ArtifactResolution(_) => 502,
            _ => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<max_crypto::CryptoError> for SamlError {
    fn from(err: max_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}
