//! NATS implementation of the bus transport.

use std::time::Duration;

use async_nats::connection::State;
use async_trait::async_trait;
use futures::StreamExt;

use super::{BusConnection, BusConnector, BusMessage, BusSubscription, TransportError};

/// Default timeout for the initial TCP/handshake with the NATS server.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a NATS server.
pub struct NatsConnector {
    connect_timeout: Duration,
}

impl NatsConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for NatsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusConnector for NatsConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn BusConnection>, TransportError> {
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(self.connect_timeout)
            .connect(address)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::info!(address, "Connected to NATS");
        Ok(Box::new(NatsConnection { client }))
    }
}

/// A live NATS client. The client reconnects on its own after the initial
/// connection succeeded.
struct NatsConnection {
    client: async_nats::Client,
}

#[async_trait]
impl BusConnection for NatsConnection {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        // `publish` only buffers; the flush is the server-side acknowledgement.
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<BusSubscription, TransportError> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let messages = subscriber.map(|msg| BusMessage {
            topic: msg.subject.to_string(),
            payload: msg.payload.to_vec(),
        });

        Ok(BusSubscription::new(topic, messages))
    }

    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let connector = NatsConnector::new().with_connect_timeout(Duration::from_millis(500));

        let result = connector.connect("nats://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
