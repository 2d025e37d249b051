//! Message bus transport contract.
//!
//! The bridge and the forwarder only see these traits. Production uses
//! [`nats::NatsConnector`]; tests and single-process setups use
//! [`memory::MemoryBus`].

pub mod memory;
pub mod nats;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// A message as it travels on the bus.
#[derive(Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Debug for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusMessage")
            .field("topic", &self.topic)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

/// Error type for bus transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to bus: {0}")]
    Connect(String),

    #[error("Bus publish failed: {0}")]
    Publish(String),

    #[error("Bus subscribe failed: {0}")]
    Subscribe(String),

    #[error("Bus operation timed out")]
    Timeout,

    #[error("Bus connection is not established")]
    NotConnected,
}

/// Ordered stream of messages received on one topic.
pub struct BusSubscription {
    topic: String,
    messages: BoxStream<'static, BusMessage>,
}

impl BusSubscription {
    pub fn new(
        topic: impl Into<String>,
        messages: impl Stream<Item = BusMessage> + Send + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            messages: messages.boxed(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message. `None` once the transport closed the
    /// subscription.
    pub async fn next(&mut self) -> Option<BusMessage> {
        self.messages.next().await
    }
}

/// An open bus connection.
#[async_trait]
pub trait BusConnection: Send + Sync + 'static {
    /// Publish `payload` on `topic`. `Ok` means the transport accepted the
    /// write.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to `topic`; messages are yielded in arrival order.
    async fn subscribe(&self, topic: &str) -> Result<BusSubscription, TransportError>;

    /// Whether the transport currently reports a live link to the bus.
    fn is_connected(&self) -> bool;
}

/// Opens bus connections.
#[async_trait]
pub trait BusConnector: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> Result<Box<dyn BusConnection>, TransportError>;
}
