//! OAuth2 client-credentials support for secured egress
//!
//! Secured egress is Enabled when client credentials are configured and
//! Disabled otherwise; callers hold an `Option<TokenProvider>` accordingly.

mod discovery;
mod token;

pub use discovery::{discover, discover_with_timeout, DiscoveryDocument, DISCOVERY_TIMEOUT};
pub use token::{TokenProvider, TOKEN_EXPIRY_SKEW};

use std::fmt;

/// Where the token endpoint comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEndpoint {
    /// Token URL supplied directly
    Static(String),
    /// Well-known discovery document URL; the token endpoint is read from it
    Discovery(String),
}

#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub endpoint: TokenEndpoint,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth discovery failed: {0}")]
    Discovery(String),

    #[error("token request failed: {0}")]
    TokenRequest(String),

    #[error("invalid token response: {0}")]
    TokenResponse(String),
}
