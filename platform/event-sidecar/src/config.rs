use std::env;
use std::time::Duration;

use crate::oauth::{OAuthConfig, TokenEndpoint};

pub const DEFAULT_RECIPIENT: &str = "http://127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HEALTH_PORT: u16 = 8081;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Log output format selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT`, loading `.env` first since this runs before any config
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match non_empty(&lookup, "LOG_FORMAT") {
            Some(raw) if raw.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Settings for the bus → HTTP direction
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub pubsub_url: String,
    pub pubsub_topic: String,
    pub recipient_url: String,
    pub health_port: u16,
    pub http_timeout: Duration,
    pub oauth: Option<OAuthConfig>,
}

impl DistributorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pubsub_url = required(&lookup, "PUBSUB_URL")?;
        let pubsub_topic = required(&lookup, "PUBSUB_TOPIC")?;

        let recipient_host =
            non_empty(&lookup, "PUBSUB_RECIPIENT").unwrap_or_else(|| DEFAULT_RECIPIENT.to_string());
        let recipient_port = parse_or(&lookup, "PUBSUB_RECIPIENT_PORT", DEFAULT_PORT)?;
        let recipient_path = non_empty(&lookup, "PUBSUB_RECIPIENT_PATH").unwrap_or_default();

        let http_timeout_secs = parse_or(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;

        Ok(Self {
            pubsub_url,
            pubsub_topic,
            recipient_url: recipient_url(&recipient_host, recipient_port, &recipient_path),
            health_port: parse_or(&lookup, "HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            http_timeout: Duration::from_secs(http_timeout_secs.max(1)),
            oauth: oauth_from_lookup(&lookup)?,
        })
    }
}

/// Settings for the HTTP → bus direction
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub pubsub_url: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = non_empty(&lookup, "RCV_PATH").unwrap_or_else(|| "/".to_string());

        Ok(Self {
            pubsub_url: required(&lookup, "PUBSUB_URL")?,
            host: non_empty(&lookup, "HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "RCV_PORT", DEFAULT_PORT)?,
            path: with_leading_slash(&path),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Assemble the forwarding target from host, port and path
///
/// A bare host gets `http://`; a path without a leading slash gets one.
pub fn recipient_url(host: &str, port: u16, path: &str) -> String {
    let host = host.trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    if path.is_empty() {
        format!("{}:{}", base, port)
    } else {
        format!("{}:{}{}", base, port, with_leading_slash(path))
    }
}

fn oauth_from_lookup<F>(lookup: &F) -> Result<Option<OAuthConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = non_empty(lookup, "OAUTH_CLIENT_ID");
    let client_secret = non_empty(lookup, "OAUTH_CLIENT_SECRET");

    let (client_id, client_secret) = match (client_id, client_secret) {
        (Some(id), Some(secret)) => (id, secret),
        (None, None) => return Ok(None),
        (Some(_), None) => return Err(ConfigError::Missing("OAUTH_CLIENT_SECRET")),
        (None, Some(_)) => return Err(ConfigError::Missing("OAUTH_CLIENT_ID")),
    };

    // A static token URL wins over discovery
    let endpoint = match (
        non_empty(lookup, "OAUTH_TOKEN_URL"),
        non_empty(lookup, "OAUTH_DISCOVERY"),
    ) {
        (Some(url), _) => TokenEndpoint::Static(url),
        (None, Some(url)) => TokenEndpoint::Discovery(url),
        (None, None) => {
            return Err(ConfigError::Invalid {
                name: "OAUTH_DISCOVERY",
                reason: "OAuth client credentials need OAUTH_DISCOVERY or OAUTH_TOKEN_URL"
                    .to_string(),
            })
        }
    };

    let scopes = non_empty(lookup, "OAUTH_SCOPES")
        .map(|raw| {
            raw.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(OAuthConfig {
        client_id,
        client_secret,
        scopes,
        endpoint,
    }))
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).ok_or(ConfigError::Missing(name))
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
