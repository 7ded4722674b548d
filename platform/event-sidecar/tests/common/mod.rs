#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use event_bus::{ConnectionCache, InMemoryBus, InMemoryConnector};
use event_sidecar::{Distributor, HttpTransport};

pub const TOPIC: &str = "sh.keptn.events.deployment-finished";

/// Example event as emitted by a Keptn service
pub const SAMPLE_EVENT: &str = r#"{"id":"e1","type":"sh.keptn.events.deployment-finished","source":"svc-a","specversion":"1.0","extensions":{"shkeptncontext":"ctx-123"},"data":{"project":"sockshop"}}"#;

pub fn connector() -> InMemoryConnector {
    InMemoryConnector::new(InMemoryBus::new())
}

pub fn cache(connector: &InMemoryConnector) -> ConnectionCache {
    ConnectionCache::new(Arc::new(connector.clone()))
}

pub fn transport() -> HttpTransport {
    HttpTransport::new(Duration::from_secs(5)).expect("http client")
}

pub fn distributor(connector: &InMemoryConnector, recipient_url: &str) -> Distributor {
    Distributor::new(cache(connector), transport(), TOPIC, recipient_url)
}

pub fn event_json(id: &str, event_type: &str, context: &str) -> String {
    serde_json::json!({
        "id": id,
        "type": event_type,
        "source": "test",
        "extensions": { "shkeptncontext": context }
    })
    .to_string()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
