//! # EventBus Abstraction
//!
//! Bus-side building blocks for the event-distribution sidecar.
//!
//! ## What Lives Here
//!
//! - **Envelope**: the transport-neutral event record moved between the bus and HTTP
//! - **EventBus**: publish/subscribe over one established bus connection
//! - **BusConnector**: creates a dedicated connection for a topic
//! - **ConnectionCache**: at most one live connection per topic, created on first use
//!
//! ## Implementations
//!
//! - **NatsBus / NatsConnector**: Production implementation using NATS
//! - **InMemoryBus / InMemoryConnector**: Test/dev implementation using in-memory channels
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{publish_envelope, ConnectionCache, Envelope, NatsConnector};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ConnectionCache::new(Arc::new(NatsConnector::new("nats://localhost:4222")));
//!
//! let envelope = Envelope::new("e1", "sh.keptn.events.deployment-finished", "svc-a")?
//!     .with_correlation_id("ctx-123");
//!
//! let bus = cache.get_or_create(envelope.event_type()).await?;
//! publish_envelope(bus.as_ref(), &envelope).await?;
//! # Ok(())
//! # }
//! ```

mod connection_cache;
mod envelope;
mod inmemory_bus;
mod nats_bus;

pub use connection_cache::ConnectionCache;
pub use envelope::{Envelope, EnvelopeError, CORRELATION_EXTENSION};
pub use inmemory_bus::{InMemoryBus, InMemoryConnector};
pub use nats_bus::{NatsBus, NatsConnector};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject/topic this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// Optional headers carried by the backend
    pub headers: Option<std::collections::HashMap<String, String>>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            headers: None,
        }
    }

    /// Add headers to the message
    pub fn with_headers(mut self, headers: std::collections::HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Decode the payload as an [`Envelope`]
    pub fn envelope(&self) -> Result<Envelope, EnvelopeError> {
        Envelope::from_json_slice(&self.payload)
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject: {0}")]
    InvalidSubject(String),
}

impl From<EnvelopeError> for BusError {
    fn from(e: EnvelopeError) -> Self {
        BusError::SerializationError(e.to_string())
    }
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// One established connection to the pub/sub backend
///
/// Publishing is synchronous from the caller's point of view: the call returns
/// once the backend accepted the message, and a failure is handed back to the
/// caller without internal retry.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message to a subject
    ///
    /// # Arguments
    /// * `subject` - The subject/topic to publish to (e.g., "sh.keptn.events.deployment-finished")
    /// * `payload` - The message payload as raw bytes
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to messages on a subject
    ///
    /// The returned stream is lazy and unbounded; polling it parks the caller
    /// until the next message arrives. It ends only when the connection closes.
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;

    /// Whether the underlying connection is currently usable
    fn is_connected(&self) -> bool {
        true
    }
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

/// Factory for bus connections
///
/// Each call establishes a brand new connection dedicated to `topic`. Callers
/// normally go through [`ConnectionCache`], which guarantees a connector is
/// invoked at most once per topic.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self, topic: &str) -> BusResult<Arc<dyn EventBus>>;
}

/// Serialize `envelope` and publish it on the subject named by its `type`
pub async fn publish_envelope(bus: &dyn EventBus, envelope: &Envelope) -> BusResult<()> {
    let payload = envelope.to_json_bytes()?;
    bus.publish(envelope.event_type(), payload).await
}

/// Reject subjects NATS cannot carry
pub fn validate_subject(subject: &str) -> BusResult<()> {
    if subject.is_empty() {
        return Err(BusError::InvalidSubject("subject cannot be empty".to_string()));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(BusError::InvalidSubject(format!(
            "subject '{}' contains whitespace",
            subject
        )));
    }
    Ok(())
}
