//! # Event Envelope
//!
//! The wire-neutral event record bridged between the bus and HTTP.
//!
//! ## Envelope Fields
//!
//! - `id`: Caller-assigned identifier, used for tracing only (never deduplicated)
//! - `type`: Event kind; the Broker also uses it as the bus topic
//! - `source`: URI identifying the producer (optional)
//! - `time`: Creation timestamp, carried as received
//! - `specversion` / `datacontenttype`: Format metadata, passed through untouched
//! - `extensions`: Opaque key/value attributes, including `shkeptncontext`
//! - `data`: Event payload, never interpreted
//!
//! Any other top-level attribute is kept in [`Envelope::attributes`] and
//! written back out unchanged.
//!
//! Every `Envelope` value has a non-empty `id` and `type`: construction and
//! deserialization both enforce it. Nothing else is validated.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Extension key carrying the workflow correlation identifier
pub const CORRELATION_EXTENSION: &str = "shkeptncontext";

/// Reasons an envelope is refused
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope id cannot be empty")]
    MissingId,

    #[error("envelope type cannot be empty")]
    MissingType,

    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Transport-neutral event envelope
///
/// # Examples
///
/// ```rust
/// use event_bus::Envelope;
///
/// let envelope = Envelope::new("e1", "sh.keptn.events.deployment-finished", "svc-a")
///     .unwrap()
///     .with_correlation_id("ctx-123")
///     .with_data(serde_json::json!({"project": "sockshop"}));
///
/// assert_eq!(envelope.correlation_id(), Some("ctx-123"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    id: String,

    #[serde(rename = "type")]
    event_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    // opaque: offsets and precision survive a round trip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<Value>,

    #[serde(rename = "specversion", skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,

    #[serde(rename = "datacontenttype", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Top-level attributes not modeled above
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

/// Unvalidated wire shape; converted into [`Envelope`] through `try_from`
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: String,

    #[serde(rename = "type", default)]
    event_type: String,

    #[serde(default)]
    source: Option<String>,

    #[serde(default)]
    time: Option<Value>,

    #[serde(rename = "specversion", alias = "specVersion", default)]
    spec_version: Option<String>,

    #[serde(rename = "datacontenttype", alias = "contentType", default)]
    content_type: Option<String>,

    #[serde(default)]
    extensions: BTreeMap<String, Value>,

    #[serde(default)]
    data: Option<Value>,

    #[serde(flatten)]
    attributes: BTreeMap<String, Value>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let mut envelope = Envelope::validated(raw.id, raw.event_type)?;
        envelope.source = raw.source;
        envelope.time = raw.time;
        envelope.spec_version = raw.spec_version;
        envelope.content_type = raw.content_type;
        envelope.extensions = raw.extensions;
        envelope.data = raw.data;
        envelope.attributes = raw.attributes;
        Ok(envelope)
    }
}

impl Envelope {
    /// Create an envelope, rejecting an empty `id` or `type`
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, EnvelopeError> {
        let mut envelope = Self::validated(id.into(), event_type.into())?;
        envelope.source = Some(source.into());
        Ok(envelope)
    }

    fn validated(id: String, event_type: String) -> Result<Self, EnvelopeError> {
        if id.trim().is_empty() {
            return Err(EnvelopeError::MissingId);
        }
        if event_type.trim().is_empty() {
            return Err(EnvelopeError::MissingType);
        }

        Ok(Self {
            id,
            event_type,
            source: None,
            time: None,
            spec_version: None,
            content_type: None,
            extensions: BTreeMap::new(),
            data: None,
            attributes: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event kind; doubles as the bus topic
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The `shkeptncontext` value, if present as a string
    ///
    /// Looked up in `extensions` first, then among top-level attributes where
    /// structured-mode producers put it.
    pub fn correlation_id(&self) -> Option<&str> {
        self.extensions
            .get(CORRELATION_EXTENSION)
            .or_else(|| self.attributes.get(CORRELATION_EXTENSION))
            .and_then(Value::as_str)
    }

    /// `time` parsed as RFC 3339; `None` when absent or not parseable
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.time
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(Value::String(
            time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ));
        self
    }

    pub fn with_spec_version(mut self, spec_version: impl Into<String>) -> Self {
        self.spec_version = Some(spec_version.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.with_extension(CORRELATION_EXTENSION, Value::String(correlation_id.into()))
    }

    /// Structured JSON encoding shared by both transports
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Decode and validate a structured JSON envelope
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| {
            // serde wraps try_from failures as custom messages; keep the text
            EnvelopeError::Malformed(e.to_string())
        })
    }
}
