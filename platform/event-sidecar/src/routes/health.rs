use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use event_bus::ConnectionCache;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub connections: ConnectionCache,
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .with_state(state)
}

pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

/// Ready while every cached bus connection is up
///
/// A process that has not opened any connection yet counts as ready.
pub async fn health_ready(
    State(state): State<Arc<HealthState>>,
) -> Result<Json<Value>, StatusCode> {
    if !state.connections.all_connected() {
        tracing::warn!("Readiness check failed: bus connection down");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({
        "status": "ready",
        "nats": "connected",
        "connections": state.connections.len()
    })))
}
