use std::sync::Arc;

use axum::Router;
use event_bus::{ConnectionCache, NatsConnector};
use event_sidecar::{
    config::{BrokerConfig, LogFormat},
    middleware,
    routes::health::{self, HealthState},
    shutdown::shutdown_signal,
    telemetry, Broker,
};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing(LogFormat::from_env());

    let cfg = BrokerConfig::from_env()?;
    tracing::info!(pubsub_url = %cfg.pubsub_url, path = %cfg.path, "Starting event broker");

    let connections = ConnectionCache::new(Arc::new(NatsConnector::new(cfg.pubsub_url.clone())));
    let broker = Arc::new(Broker::new(connections.clone()));

    let app = Router::new()
        .merge(health::router(Arc::new(HealthState { connections })))
        .merge(event_sidecar::router(broker, &cfg.path))
        // trace id propagation
        .layer(axum::middleware::from_fn(middleware::tracing::trace_id_middleware))
        .layer(TraceLayer::new_for_http());

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Event broker stopped");
    Ok(())
}
