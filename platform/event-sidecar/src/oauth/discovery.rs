use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::OAuthError;

/// Upper bound for one discovery round trip
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Subset of the OpenID/OAuth discovery document the sidecar relies on
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
}

impl DiscoveryDocument {
    /// Servers that omit `grant_types_supported` are assumed to allow it
    pub fn supports_client_credentials(&self) -> bool {
        self.grant_types_supported.is_empty()
            || self
                .grant_types_supported
                .iter()
                .any(|g| g == "client_credentials")
    }
}

/// Fetch the discovery document at `url`, bounded by [`DISCOVERY_TIMEOUT`]
///
/// Anything other than a 200 with a well-formed document, including a
/// timeout, is an [`OAuthError::Discovery`].
pub async fn discover(client: &Client, url: &str) -> Result<DiscoveryDocument, OAuthError> {
    discover_with_timeout(client, url, DISCOVERY_TIMEOUT).await
}

pub async fn discover_with_timeout(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<DiscoveryDocument, OAuthError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| OAuthError::Discovery(format!("{}: {}", url, e)))?;

    if response.status() != StatusCode::OK {
        return Err(OAuthError::Discovery(format!(
            "{} returned status {}",
            url,
            response.status()
        )));
    }

    let document: DiscoveryDocument = response
        .json()
        .await
        .map_err(|e| OAuthError::Discovery(format!("malformed document from {}: {}", url, e)))?;

    if !document.supports_client_credentials() {
        return Err(OAuthError::Discovery(format!(
            "{} does not support the client_credentials grant",
            document.issuer
        )));
    }

    tracing::debug!(
        issuer = %document.issuer,
        token_endpoint = %document.token_endpoint,
        "OAuth discovery complete"
    );

    Ok(document)
}
