//! HTTP egress for envelopes
//!
//! The receive side of the HTTP transport is the Broker's axum router.

use event_bus::Envelope;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Content type of a structured-mode JSON event
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} responded with status {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
}

impl TransportError {
    /// True when the recipient could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Request { .. })
    }
}

/// Posts envelopes as structured JSON; one instance per process
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// POST `envelope` to `url`; any non-2xx status is a failure. No retry.
    pub async fn send(
        &self,
        url: &str,
        envelope: &Envelope,
        bearer_token: Option<&str>,
    ) -> Result<(), TransportError> {
        let body = envelope
            .to_json_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, STRUCTURED_CONTENT_TYPE)
            .body(body);

        if let Some(token) = bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            event_id = %envelope.id(),
            "Envelope delivered"
        );

        Ok(())
    }
}
