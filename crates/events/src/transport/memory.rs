//! In-process bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`MemoryBus`] behaves like a tiny single-node broker: every connection
//! made from it shares one channel, subscribers only see their topic, and
//! the whole bus can be taken offline to exercise outage handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{BusConnection, BusConnector, BusMessage, BusSubscription, TransportError};

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<BusMessage>,
    online: Arc<AtomicBool>,
}

impl MemoryBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow subscribers skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A bus that refuses connections and publishes until brought online.
    pub fn offline() -> Self {
        let bus = Self::default();
        bus.set_online(false);
        bus
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Open a connection without going through [`BusConnector`].
    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection { bus: self.clone() }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl BusConnector for MemoryBus {
    async fn connect(&self, _address: &str) -> Result<Box<dyn BusConnection>, TransportError> {
        if !self.is_online() {
            return Err(TransportError::Connect("memory bus is offline".into()));
        }
        Ok(Box::new(self.connection()))
    }
}

/// Connection handle onto a [`MemoryBus`].
pub struct MemoryConnection {
    bus: MemoryBus,
}

#[async_trait]
impl BusConnection for MemoryConnection {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.bus.is_online() {
            return Err(TransportError::Publish("memory bus is offline".into()));
        }
        // A SendError only means there are no subscribers right now.
        let _ = self.bus.sender.send(BusMessage::new(topic, payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusSubscription, TransportError> {
        if !self.bus.is_online() {
            return Err(TransportError::Subscribe("memory bus is offline".into()));
        }

        let receiver = self.bus.sender.subscribe();
        let wanted = topic.to_string();

        let messages = futures::stream::unfold(receiver, move |mut receiver| {
            let wanted = wanted.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) if message.topic == wanted => return Some((message, receiver)),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, topic = %wanted, "Memory bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(BusSubscription::new(topic, messages))
    }

    fn is_connected(&self) -> bool {
        self.bus.is_online()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
