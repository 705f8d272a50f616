//! `AuthnRequest` generation.
//!
//! The XML is written directly in exclusive canonical form: no declaration,
//! attributes in sorted order, expanded empty elements and `xmlns:saml`
//! declared on each element that first uses the prefix. That keeps the
//! enveloped signature digest stable without a canonicalizer.

use chrono::{DateTime, Utc};

use crate::constants::{AUTHN_CONTEXT_MOBILE_TWO_FACTOR, SAML_NS, SAMLP_NS};
use crate::xml::{escape_attr, escape_text};

/// A SAML `AuthnRequest` for DigiD or TVS.
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    /// Request id, referenced by the signature.
    pub id: String,
    /// Creation time.
    pub issue_instant: DateTime<Utc>,
    /// Single sign-on location of the identity provider.
    pub destination: String,
    /// Our entity id.
    pub issuer: String,
    /// Where the artifact should be delivered.
    pub assertion_consumer_service_url: Option<String>,
    /// Index of our assertion consumer service in registered metadata.
    pub assertion_consumer_service_index: Option<u32>,
    /// Index of our attribute consuming service in registered metadata.
    pub attribute_consuming_service_index: Option<u32>,
    /// Human-readable service name.
    pub provider_name: Option<String>,
    /// Require the user to log in again.
    pub force_authn: bool,
    /// `IDPEntry` provider ids for `Scoping`.
    pub scoping_list: Vec<String>,
    /// `RequesterID` values for `Scoping`.
    pub request_ids: Vec<String>,
}

impl AuthnRequest {
    /// A request to `destination` issued by `issuer`, with a fresh id.
    pub fn new(destination: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: max_crypto::random::saml_id(),
            issue_instant: Utc::now(),
            destination: destination.into(),
            issuer: issuer.into(),
            assertion_consumer_service_url: None,
            assertion_consumer_service_index: None,
            attribute_consuming_service_index: None,
            provider_name: None,
            force_authn: false,
            scoping_list: Vec::new(),
            request_ids: Vec::new(),
        }
    }

    /// Sets the `Scoping` entries.
    #[must_use]
    pub fn with_scoping(mut self, scoping_list: Vec<String>, request_ids: Vec<String>) -> Self {
        self.scoping_list = scoping_list;
        self.request_ids = request_ids;
        self
    }

    /// Unsigned XML in canonical form.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut attributes: Vec<(&str, String)> = vec![
            ("Destination", self.destination.clone()),
            ("ID", self.id.clone()),
            (
                "IssueInstant",
                self.issue_instant.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
            ("Version", "2.0".to_string()),
        ];
        if let Some(url) = &self.assertion_consumer_service_url {
            attributes.push(("AssertionConsumerServiceURL", url.clone()));
        }
        if let Some(index) = self.assertion_consumer_service_index {
            attributes.push(("AssertionConsumerServiceIndex", index.to_string()));
        }
        if let Some(index) = self.attribute_consuming_service_index {
            attributes.push(("AttributeConsumingServiceIndex", index.to_string()));
        }
        if let Some(name) = &self.provider_name {
            attributes.push(("ProviderName", name.clone()));
        }
        if self.force_authn {
            attributes.push(("ForceAuthn", "true".to_string()));
        }
        attributes.sort_by(|a, b| a.0.cmp(b.0));

        let mut xml = format!(r#"<samlp:AuthnRequest xmlns:samlp="{SAMLP_NS}""#);
        for (name, value) in &attributes {
            xml.push_str(&format!(r#" {name}="{}""#, escape_attr(value)));
        }
        xml.push('>');

        xml.push_str(&format!(
            r#"<saml:Issuer xmlns:saml="{SAML_NS}">{}</saml:Issuer>"#,
            escape_text(&self.issuer)
        ));
        xml.push_str(&format!(
            r#"<samlp:RequestedAuthnContext Comparison="minimum"><saml:AuthnContextClassRef xmlns:saml="{SAML_NS}">{AUTHN_CONTEXT_MOBILE_TWO_FACTOR}</saml:AuthnContextClassRef></samlp:RequestedAuthnContext>"#
        ));
        self.write_scoping(&mut xml);

        xml.push_str("</samlp:AuthnRequest>");
        xml
    }

    fn write_scoping(&self, xml: &mut String) {
        if self.scoping_list.is_empty() && self.request_ids.is_empty() {
            return;
        }
        xml.push_str("<samlp:Scoping>");
        if !self.scoping_list.is_empty() {
            xml.push_str("<samlp:IDPList>");
            for provider in &self.scoping_list {
                xml.push_str(&format!(
                    r#"<samlp:IDPEntry ProviderID="{}"></samlp:IDPEntry>"#,
                    escape_attr(provider)
                ));
            }
            xml.push_str("</samlp:IDPList>");
        }
        for requester in &self.request_ids {
            xml.push_str(&format!(
                "<samlp:RequesterID>{}</samlp:RequesterID>",
                escape_text(requester)
            ));
        }
        xml.push_str("</samlp:Scoping>");
    }
}
