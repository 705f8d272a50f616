//! HTML pages, compiled in with askama.

use askama::Template;
use axum::response::{Html, IntoResponse, Response};

use crate::error::MaxResult;

/// A login method on the options page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOption {
    /// Button text.
    pub label: String,
    /// Authorize URL with this method as the only login hint.
    pub url: String,
}

/// Lets the user pick a login method when more than one applies.
#[derive(Template)]
#[template(path = "login_options.html")]
pub struct LoginOptionsTemplate {
    /// Display name of the client.
    pub client_name: String,
    /// Available methods.
    pub options: Vec<LoginOption>,
}

/// Auto-submitting form carrying an `AuthnRequest` (POST binding).
#[derive(Template)]
#[template(path = "authn_request.html")]
pub struct AuthnRequestTemplate {
    /// Form action.
    pub sso_url: String,
    /// Base64 encoded request.
    pub saml_request: String,
    /// Relay state, our randstate.
    pub relay_state: String,
}

/// Stand-in for the DigiD login page.
#[derive(Template)]
#[template(path = "digid_mock.html")]
pub struct DigidMockTemplate {
    /// Randstate of the login.
    pub state: String,
    /// Identity provider that would have been used.
    pub idp_name: String,
    /// Client the user is logging in to.
    pub client_id: String,
    /// Prefilled BSN.
    pub bsn: String,
    /// Where "cancel" leads.
    pub cancel_url: String,
}

/// Renders a template into an HTML response.
///
/// # Errors
///
/// Returns [`crate::MaxError::Template`] when rendering fails.
pub fn render<T: Template>(template: &T) -> MaxResult<Response> {
    Ok(Html(template.render()?).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn login_options_escape_urls() {
        let html = LoginOptionsTemplate {
            client_name: "Test Client".to_string(),
            options: vec![LoginOption {
                label: "digid".to_string(),
                url: "/authorize?client_id=a&login_hints=digid".to_string(),
            }],
        }
        .render()
        .unwrap();
        assert!(html.contains("Inloggen bij Test Client"));
        assert!(html.contains("client_id=a&amp;login_hints=digid"));
    }

    #[test]
    fn authn_request_form_posts_to_sso_url() {
        let html = AuthnRequestTemplate {
            sso_url: "https://idp/sso".to_string(),
            saml_request: "PHNhbWxwOkF1dGhuUmVxdWVzdA==".to_string(),
            relay_state: "eyJzdGF0ZSI6ICJhIn0=".to_string(),
        }
        .render()
        .unwrap();
        assert!(html.contains(r#"value="PHNhbWxwOkF1dGhuUmVxdWVzdA==""#));
        assert!(html.contains(r#"name="SAMLRequest""#));
        assert!(html.contains("submit()"));
    }
}
