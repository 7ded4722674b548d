//! NATS-based implementation of the EventBus trait

use crate::{validate_subject, BusConnector, BusError, BusMessage, BusResult, EventBus};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// EventBus implementation over one NATS connection
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = NatsBus::connect("nats://localhost:4222", "sh.keptn.events.test").await?;
/// bus.publish("sh.keptn.events.test", b"{}".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Open a new connection to `url`, naming it after the topic it serves
    pub async fn connect(url: &str, topic: &str) -> BusResult<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(format!("event-sidecar:{}", topic))
            .connection_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| BusError::ConnectionError(format!("{}: {}", url, e)))?;

        tracing::info!(url = %url, topic = %topic, "Connected to NATS");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        validate_subject(subject)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        // Core NATS publish only buffers; flush so failures surface to the caller
        self.client
            .flush()
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        validate_subject(subject)?;

        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let stream = subscriber.map(|nats_msg| {
            let mut msg = BusMessage::new(nats_msg.subject.to_string(), nats_msg.payload.to_vec());

            if let Some(nats_headers) = nats_msg.headers {
                let mut headers = std::collections::HashMap::new();
                for (key, values) in nats_headers.iter() {
                    if let Some(value) = values.first() {
                        headers.insert(key.to_string(), value.to_string());
                    }
                }
                if !headers.is_empty() {
                    msg = msg.with_headers(headers);
                }
            }

            msg
        });

        Ok(stream.boxed())
    }

    fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}

/// Opens one dedicated NATS connection per topic
#[derive(Debug, Clone)]
pub struct NatsConnector {
    url: String,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BusConnector for NatsConnector {
    async fn connect(&self, topic: &str) -> BusResult<Arc<dyn EventBus>> {
        let bus = NatsBus::connect(&self.url, topic).await?;
        Ok(Arc::new(bus))
    }
}
