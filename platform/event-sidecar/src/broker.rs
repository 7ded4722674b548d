//! Broker: HTTP → bus
//!
//! Accepts structured JSON envelopes over HTTP and publishes each one on the
//! bus subject equal to its `type`. The response is written before the
//! publish completes; publish failures only show up in the logs.

use axum::{
    body::Bytes,
    extract::State,
    http::{Extensions, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use event_bus::{publish_envelope, validate_subject, ConnectionCache, Envelope};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;

use crate::error::SidecarError;
use crate::middleware::tracing::TraceId;

#[derive(Clone)]
pub struct Broker {
    connections: ConnectionCache,
}

impl Broker {
    pub fn new(connections: ConnectionCache) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &ConnectionCache {
        &self.connections
    }

    /// Publish `envelope` on the subject named by its type
    ///
    /// The first event of a type opens that topic's connection; later events
    /// of the same type reuse it. A type that is not a valid subject never
    /// opens a connection.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), SidecarError> {
        validate_subject(envelope.event_type())?;
        let bus = self.connections.get_or_create(envelope.event_type()).await?;
        publish_envelope(bus.as_ref(), envelope).await?;
        Ok(())
    }
}

/// Routes the ingress endpoint at `path`
pub fn router(broker: Arc<Broker>, path: &str) -> Router {
    Router::new()
        .route(path, post(receive_event))
        .with_state(broker)
}

async fn receive_event(
    State(broker): State<Arc<Broker>>,
    extensions: Extensions,
    body: Bytes,
) -> Response {
    let envelope = match Envelope::from_json_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "Rejected malformed event");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    // the spawned publish outlives the request span
    let trace_id = extensions
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let span = tracing::info_span!(
        "publish",
        trace_id = %trace_id,
        event_id = %envelope.id(),
        event_type = %envelope.event_type(),
        shkeptncontext = envelope.correlation_id().unwrap_or(""),
    );

    tokio::spawn(
        async move {
            match broker.publish(&envelope).await {
                Ok(()) => tracing::info!("Event published"),
                Err(e) => tracing::error!(error = %e, "Failed to publish event"),
            }
        }
        .instrument(span),
    );

    StatusCode::ACCEPTED.into_response()
}
