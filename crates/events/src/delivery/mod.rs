//! Outbound notification sinks.
//!
//! The forwarder hands every relayed message to a [`NotificationSink`].
//! Sinks own their retry and rate-limit handling; a returned error means
//! the message is lost.

pub mod log;
pub mod webhook;

use async_trait::async_trait;

use self::webhook::WebhookError;

/// Error type for sink delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// The sink refused the message for a sink-specific reason.
    #[error("Sink rejected message: {0}")]
    Rejected(String),
}

/// Destination for human-readable mutation notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `text`, retrying internally as the sink sees fit.
    async fn send(&self, text: &str) -> Result<(), SinkError>;
}
