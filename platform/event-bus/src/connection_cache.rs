//! Per-topic connection cache
//!
//! Holds at most one live bus connection per topic for the lifetime of the
//! process. Creation is serialized per key: concurrent first uses of the same
//! topic run the connector once and all receive the same handle, while first
//! uses of different topics proceed independently.

use crate::{BusConnector, BusResult, EventBus};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<dyn EventBus>>>;

#[derive(Clone)]
pub struct ConnectionCache {
    connector: Arc<dyn BusConnector>,
    // topic -> lazily initialized connection
    slots: Arc<DashMap<String, Slot>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn BusConnector>) -> Self {
        Self {
            connector,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Return the cached connection for `topic`, creating it on first use
    ///
    /// A failed creation leaves the slot empty, so the next caller tries again.
    pub async fn get_or_create(&self, topic: &str) -> BusResult<Arc<dyn EventBus>> {
        let slot = self.slot_for(topic);

        let bus = slot
            .get_or_try_init(|| async {
                tracing::debug!(topic = %topic, "Creating bus connection");
                self.connector.connect(topic).await
            })
            .await?;

        Ok(bus.clone())
    }

    /// Cached connection for `topic`, without creating one
    pub fn get(&self, topic: &str) -> Option<Arc<dyn EventBus>> {
        self.slots
            .get(topic)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Number of topics with an established connection
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every established connection reports itself connected
    pub fn all_connected(&self) -> bool {
        self.slots
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .all(|bus| bus.is_connected())
    }

    fn slot_for(&self, topic: &str) -> Slot {
        if let Some(slot) = self.slots.get(topic) {
            return slot.value().clone();
        }

        // entry() holds the shard lock, so two racing inserts agree on one slot
        self.slots
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}
