//! Distributor: bus → HTTP
//!
//! Subscribes to one topic and forwards each envelope, one at a time and in
//! receipt order, to one HTTP recipient. A failed delivery is logged and the
//! envelope dropped; the loop moves on to the next message. There is no
//! buffering, so a slow recipient holds up ingestion.

use event_bus::{BusMessage, ConnectionCache, Envelope};
use futures::stream::{BoxStream, StreamExt};
use tracing::Instrument;

use crate::error::SidecarError;
use crate::oauth::TokenProvider;
use crate::transport::HttpTransport;

#[derive(Clone)]
pub struct Distributor {
    connections: ConnectionCache,
    transport: HttpTransport,
    tokens: Option<TokenProvider>,
    topic: String,
    recipient_url: String,
}

impl Distributor {
    pub fn new(
        connections: ConnectionCache,
        transport: HttpTransport,
        topic: impl Into<String>,
        recipient_url: impl Into<String>,
    ) -> Self {
        Self {
            connections,
            transport,
            tokens: None,
            topic: topic.into(),
            recipient_url: recipient_url.into(),
        }
    }

    /// Enable secured egress
    pub fn with_token_provider(mut self, tokens: TokenProvider) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Establish the topic connection and subscription
    ///
    /// Failure here is fatal for the process: without a subscription the
    /// distributor has nothing to do. No retry.
    pub async fn subscribe(&self) -> Result<BoxStream<'static, BusMessage>, SidecarError> {
        let bus = self.connections.get_or_create(&self.topic).await?;
        let stream = bus.subscribe(&self.topic).await?;

        tracing::info!(
            topic = %self.topic,
            recipient = %self.recipient_url,
            oauth = self.tokens.is_some(),
            "Distributor subscribed"
        );

        Ok(stream)
    }

    /// Subscribe and forward until the subscription ends
    pub async fn run(&self) -> Result<(), SidecarError> {
        let stream = self.subscribe().await?;
        self.consume(stream).await
    }

    /// Forward every message of `stream`; returns once the stream ends
    pub async fn consume(
        &self,
        mut stream: BoxStream<'static, BusMessage>,
    ) -> Result<(), SidecarError> {
        while let Some(msg) = stream.next().await {
            self.handle_message(msg).await;
        }

        tracing::error!(topic = %self.topic, "Subscription closed");
        Err(SidecarError::SubscriptionClosed(self.topic.clone()))
    }

    async fn handle_message(&self, msg: BusMessage) {
        let envelope = match msg.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    subject = %msg.subject,
                    error = %e,
                    "Dropping undecodable bus message"
                );
                return;
            }
        };

        let span = tracing::info_span!(
            "forward",
            event_id = %envelope.id(),
            event_type = %envelope.event_type(),
            shkeptncontext = envelope.correlation_id().unwrap_or(""),
        );

        async {
            match self.forward(&envelope).await {
                Ok(()) => tracing::info!(recipient = %self.recipient_url, "Event forwarded"),
                Err(e) => tracing::error!(
                    recipient = %self.recipient_url,
                    error = %e,
                    "Failed to forward event; dropping it"
                ),
            }
        }
        .instrument(span)
        .await
    }

    /// Deliver one envelope to the recipient, with a bearer token when enabled
    pub async fn forward(&self, envelope: &Envelope) -> Result<(), SidecarError> {
        let token = self.bearer_token().await;
        self.transport
            .send(&self.recipient_url, envelope, token.as_deref())
            .await?;
        Ok(())
    }

    // Auth failures degrade to an unauthenticated send
    async fn bearer_token(&self) -> Option<String> {
        let tokens = self.tokens.as_ref()?;
        match tokens.bearer_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "Secured egress unavailable, sending without token");
                None
            }
        }
    }
}
