use std::sync::Arc;

use event_bus::{ConnectionCache, NatsConnector};
use event_sidecar::{
    config::{DistributorConfig, LogFormat},
    routes::health::{self, HealthState},
    shutdown::shutdown_signal,
    telemetry, Distributor, HttpTransport, TokenProvider,
};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing(LogFormat::from_env());

    let cfg = DistributorConfig::from_env()?;
    tracing::info!(
        pubsub_url = %cfg.pubsub_url,
        topic = %cfg.pubsub_topic,
        recipient = %cfg.recipient_url,
        "Starting distributor"
    );

    let connections = ConnectionCache::new(Arc::new(NatsConnector::new(cfg.pubsub_url.clone())));
    let transport = HttpTransport::new(cfg.http_timeout)?;

    let mut distributor = Distributor::new(
        connections.clone(),
        transport,
        cfg.pubsub_topic.clone(),
        cfg.recipient_url.clone(),
    );
    if let Some(oauth) = cfg.oauth.clone() {
        tracing::info!(client_id = %oauth.client_id, "Secured egress enabled");
        distributor = distributor.with_token_provider(TokenProvider::new(oauth, cfg.http_timeout)?);
    }

    // Subscription failure is fatal (fail-fast)
    let stream = distributor.subscribe().await?;

    let health_app = health::router(Arc::new(HealthState { connections }))
        .layer(TraceLayer::new_for_http());
    let addr = format!("0.0.0.0:{}", cfg.health_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "health endpoint listening");
    let health_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_app).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    let result = tokio::select! {
        result = distributor.consume(stream) => result,
        _ = shutdown_signal() => Ok(()),
    };

    health_server.abort();
    tracing::info!("Distributor stopped");

    result.map_err(Into::into)
}
