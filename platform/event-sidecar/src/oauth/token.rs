use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{discover, OAuthConfig, OAuthError, TokenEndpoint};

/// Safety margin subtracted from a token's lifetime (capped at half of it)
pub const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(10);

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Longest lifetime honoured; larger `expires_in` values are capped
const MAX_EXPIRES_IN_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<CachedToken>,
    // resolved token endpoint, kept once discovery succeeded
    token_endpoint: Option<String>,
}

/// Client-credentials token source with an expiry-aware cache
///
/// All state sits behind one async mutex that is held across a refresh, so
/// concurrent callers needing a token wait for a single token-endpoint call
/// instead of racing their own.
#[derive(Clone)]
pub struct TokenProvider {
    http: Client,
    config: Arc<OAuthConfig>,
    state: Arc<Mutex<TokenState>>,
}

impl TokenProvider {
    pub fn new(config: OAuthConfig, timeout: Duration) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OAuthError::TokenRequest(e.to_string()))?;

        Ok(Self::with_client(config, http))
    }

    pub fn with_client(config: OAuthConfig, http: Client) -> Self {
        let token_endpoint = match &config.endpoint {
            TokenEndpoint::Static(url) => Some(url.clone()),
            TokenEndpoint::Discovery(_) => None,
        };

        Self {
            http,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(TokenState {
                token: None,
                token_endpoint,
            })),
        }
    }

    /// Current bearer token, refreshed synchronously when missing or expired
    pub async fn bearer_token(&self) -> Result<String, OAuthError> {
        let mut state = self.state.lock().await;

        if let Some(cached) = state.token.as_ref() {
            if cached.is_valid_at(Instant::now()) {
                return Ok(cached.access_token.clone());
            }
            tracing::debug!("OAuth token expired, refreshing");
        }

        let token_endpoint = match state.token_endpoint.clone() {
            Some(url) => url,
            None => {
                let discovered = self.resolve_token_endpoint().await?;
                state.token_endpoint = Some(discovered.clone());
                discovered
            }
        };

        let fresh = self.request_token(&token_endpoint).await?;
        let access_token = fresh.access_token.clone();
        state.token = Some(fresh);

        Ok(access_token)
    }

    /// Drop the cached token; the next caller fetches a new one
    pub async fn invalidate(&self) {
        self.state.lock().await.token = None;
    }

    async fn resolve_token_endpoint(&self) -> Result<String, OAuthError> {
        match &self.config.endpoint {
            TokenEndpoint::Static(url) => Ok(url.clone()),
            TokenEndpoint::Discovery(url) => {
                let document = discover(&self.http, url).await?;
                Ok(document.token_endpoint)
            }
        }
    }

    async fn request_token(&self, token_endpoint: &str) -> Result<CachedToken, OAuthError> {
        let scope = self.config.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let issued_at = Instant::now();
        let response = self
            .http
            .post(token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::TokenRequest(format!("{}: {}", token_endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenRequest(format!(
                "{} returned status {}: {}",
                token_endpoint, status, body
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenResponse(e.to_string()))?;

        if parsed.access_token.is_empty() {
            return Err(OAuthError::TokenResponse("empty access_token".to_string()));
        }
        if let Some(token_type) = parsed.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(OAuthError::TokenResponse(format!(
                    "unsupported token_type '{}'",
                    token_type
                )));
            }
        }

        let lifetime = Duration::from_secs(
            parsed
                .expires_in
                .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
                .min(MAX_EXPIRES_IN_SECS),
        );
        let expires_at = issued_at
            .checked_add(usable_lifetime(lifetime))
            .ok_or_else(|| {
                OAuthError::TokenResponse(format!("unrepresentable expires_in {:?}", lifetime))
            })?;

        tracing::info!(
            token_endpoint = %token_endpoint,
            expires_in_secs = lifetime.as_secs(),
            "OAuth token acquired"
        );

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}

fn usable_lifetime(lifetime: Duration) -> Duration {
    lifetime - TOKEN_EXPIRY_SKEW.min(lifetime / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_lifetime_is_capped() {
        let capped = Duration::from_secs(u64::MAX.min(MAX_EXPIRES_IN_SECS));
        assert!(Instant::now().checked_add(usable_lifetime(capped)).is_some());
    }

    #[test]
    fn test_usable_lifetime_skew() {
        assert_eq!(usable_lifetime(Duration::from_secs(3600)), Duration::from_secs(3590));
        assert_eq!(usable_lifetime(Duration::from_secs(10)), Duration::from_secs(5));
        assert_eq!(usable_lifetime(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_cached_token_validity() {
        let now = Instant::now();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::from_secs(5),
        };
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::from_secs(5)));
        assert!(!token.is_valid_at(now + Duration::from_secs(6)));
    }

    #[test]
    fn test_static_endpoint_is_known_up_front() {
        let provider = TokenProvider::with_client(
            OAuthConfig {
                client_id: "c".to_string(),
                client_secret: "s".to_string(),
                scopes: vec![],
                endpoint: TokenEndpoint::Static("http://sso/token".to_string()),
            },
            Client::new(),
        );
        let state = provider.state.try_lock().unwrap();
        assert_eq!(state.token_endpoint.as_deref(), Some("http://sso/token"));
        assert!(state.token.is_none());
    }
}
