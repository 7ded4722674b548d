//! In-memory implementation of the EventBus trait for testing and development

use crate::{validate_subject, BusConnector, BusError, BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// EventBus implementation using in-memory channels
///
/// Every clone shares one broadcast channel, so a connection created for one
/// topic sees messages published through a connection created for another,
/// the same way separate NATS clients share one server.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("sh.keptn.events.test").await?;
///
/// bus.publish("sh.keptn.events.test", b"hello".to_vec()).await?;
///
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.subject, "sh.keptn.events.test");
/// assert_eq!(msg.payload, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
    published: Arc<Mutex<Vec<BusMessage>>>,
    fail_publish: Arc<AtomicBool>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus buffering up to 1000 messages per subscriber
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a new in-memory event bus with a custom buffer size
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
            published: Arc::new(Mutex::new(Vec::new())),
            fail_publish: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every message successfully published so far, in publish order
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Make subsequent publishes fail, simulating a broken backend
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        validate_subject(subject)?;

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::PublishError(format!(
                "in-memory bus rejected publish to '{}'",
                subject
            )));
        }

        let msg = BusMessage::new(subject.to_string(), payload);
        if let Ok(mut published) = self.published.lock() {
            published.push(msg.clone());
        }

        // No receivers is fine
        let _ = self.sender.send(msg);

        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        validate_subject(subject)?;

        let mut receiver = self.sender.subscribe();
        let subject = subject.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if msg.subject == subject {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, subject = %subject, "InMemoryBus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Hands out connections to one shared [`InMemoryBus`] and counts them
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    bus: InMemoryBus,
    connects: Arc<AtomicUsize>,
    fail_connect: Arc<AtomicBool>,
}

impl InMemoryConnector {
    pub fn new(bus: InMemoryBus) -> Self {
        Self {
            bus,
            connects: Arc::new(AtomicUsize::new(0)),
            fail_connect: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The shared bus every connection publishes into
    pub fn bus(&self) -> &InMemoryBus {
        &self.bus
    }

    /// Number of connections created so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make subsequent connects fail, simulating an unreachable backend
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BusConnector for InMemoryConnector {
    async fn connect(&self, topic: &str) -> BusResult<Arc<dyn EventBus>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BusError::ConnectionError(format!(
                "in-memory backend unavailable for '{}'",
                topic
            )));
        }

        // Yield so concurrent first uses overlap
        tokio::task::yield_now().await;

        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.bus.clone()))
    }
}
