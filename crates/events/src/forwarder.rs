//! Bus-to-notification-sink relay.
//!
//! [`EventForwarder`] subscribes to the mutation topic and handles one
//! message at a time: decode, format, deliver (or just log in log-only
//! mode). A message that cannot be decoded or delivered is logged and
//! dropped; the loop keeps going.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use todo_core::events::MutationEvent;
use todo_core::topics::MUTATION_TOPIC;

use crate::delivery::NotificationSink;
use crate::transport::{BusConnection, BusMessage, TransportError};

/// Forwarder configuration.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Topic to subscribe to.
    pub topic: String,
    /// Log messages instead of delivering them to the sink.
    pub log_only: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            topic: MUTATION_TOPIC.into(),
            log_only: false,
        }
    }
}

/// Lifecycle of the forwarder's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribing,
    Active,
    Closed,
}

/// What happened to a single bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The sink accepted the notification.
    Delivered,
    /// Log-only mode: written to the log, sink not called.
    Logged,
    /// Payload was not a valid mutation message; dropped.
    DecodeFailed,
    /// The sink failed; dropped.
    DeliveryFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("A notification sink is required unless log-only mode is enabled")]
    MissingSink,

    #[error("Failed to subscribe: {0}")]
    Subscribe(#[source] TransportError),
}

/// Relays mutation messages from the bus to a notification sink.
pub struct EventForwarder {
    config: ForwarderConfig,
    sink: Option<Arc<dyn NotificationSink>>,
    state: watch::Sender<SubscriptionState>,
}

impl EventForwarder {
    /// Create a forwarder. `sink` may only be `None` in log-only mode.
    pub fn new(
        config: ForwarderConfig,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> Result<Self, ForwarderError> {
        if sink.is_none() && !config.log_only {
            return Err(ForwarderError::MissingSink);
        }

        let (state, _) = watch::channel(SubscriptionState::Subscribing);
        Ok(Self {
            config,
            sink,
            state,
        })
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Watch subscription state changes.
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Subscribe and process messages until cancelled or the subscription
    /// ends.
    ///
    /// Only a failure to subscribe is returned as an error; per-message
    /// failures never end the loop.
    pub async fn run(
        &self,
        connection: &dyn BusConnection,
        cancel: CancellationToken,
    ) -> Result<(), ForwarderError> {
        self.state.send_replace(SubscriptionState::Subscribing);

        let mut subscription = match connection.subscribe(&self.config.topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.state.send_replace(SubscriptionState::Closed);
                return Err(ForwarderError::Subscribe(e));
            }
        };

        self.state.send_replace(SubscriptionState::Active);
        tracing::info!(
            topic = %subscription.topic(),
            log_only = self.config.log_only,
            "Forwarder subscribed"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Forwarder cancelled");
                    break;
                }
                message = subscription.next() => match message {
                    Some(message) => {
                        self.handle_message(&message).await;
                    }
                    None => {
                        tracing::warn!("Bus subscription ended");
                        break;
                    }
                }
            }
        }

        self.state.send_replace(SubscriptionState::Closed);
        Ok(())
    }

    /// Decode and forward a single message.
    pub async fn handle_message(&self, message: &BusMessage) -> ForwardOutcome {
        let event = match MutationEvent::decode(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    topic = %message.topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Dropping undecodable bus message"
                );
                return ForwardOutcome::DecodeFailed;
            }
        };

        let text = notification_text(&message.topic, &String::from_utf8_lossy(&message.payload));

        if self.config.log_only {
            tracing::info!(id = %event.id, action = ?event.action, %text, "Log-only mode, not delivering");
            return ForwardOutcome::Logged;
        }

        let Some(sink) = &self.sink else {
            tracing::error!(id = %event.id, "No notification sink configured");
            return ForwardOutcome::DeliveryFailed;
        };

        match sink.send(&text).await {
            Ok(()) => {
                tracing::info!(id = %event.id, action = ?event.action, "Mutation forwarded");
                ForwardOutcome::Delivered
            }
            Err(e) => {
                tracing::error!(
                    id = %event.id,
                    action = ?event.action,
                    error = %e,
                    "Notification delivery failed, dropping message"
                );
                ForwardOutcome::DeliveryFailed
            }
        }
    }
}

/// Human-facing text for a relayed message: `Received on [<topic>]: <payload>`.
pub fn notification_text(topic: &str, payload: &str) -> String {
    format!("Received on [{topic}]: {payload}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::delivery::SinkError;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, text: &str) -> Result<(), SinkError> {
            self.sent.lock().push(text.to_string());
            if self.fail {
                return Err(SinkError::Rejected("boom".into()));
            }
            Ok(())
        }
    }

    fn forwarder(log_only: bool, sink: Arc<RecordingSink>) -> EventForwarder {
        let config = ForwarderConfig {
            log_only,
            ..Default::default()
        };
        EventForwarder::new(config, Some(sink as Arc<dyn NotificationSink>)).unwrap()
    }

    fn updated_message() -> BusMessage {
        let event = MutationEvent::updated("42").with_field("done", true);
        BusMessage::new(MUTATION_TOPIC, event.encode())
    }

    #[test]
    fn notification_text_uses_received_on_label() {
        assert_eq!(
            notification_text("db-updates", "NEW TODO: {}"),
            "Received on [db-updates]: NEW TODO: {}"
        );
    }

    #[test]
    fn sink_is_required_outside_log_only_mode() {
        let result = EventForwarder::new(ForwarderConfig::default(), None);
        assert!(matches!(result, Err(ForwarderError::MissingSink)));

        let log_only = ForwarderConfig {
            log_only: true,
            ..Default::default()
        };
        assert!(EventForwarder::new(log_only, None).is_ok());
    }

    #[tokio::test]
    async fn valid_message_is_delivered() {
        let sink = Arc::new(RecordingSink::default());
        let fwd = forwarder(false, Arc::clone(&sink));

        let outcome = fwd.handle_message(&updated_message()).await;

        assert_eq!(outcome, ForwardOutcome::Delivered);
        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Received on [db-updates]: TODO UPDATED: "));
        assert!(sent[0].contains("\"42\""));
        assert!(sent[0].contains("true"));
    }

    #[tokio::test]
    async fn log_only_mode_never_calls_sink() {
        let sink = Arc::new(RecordingSink::default());
        let fwd = forwarder(true, Arc::clone(&sink));

        let outcome = fwd.handle_message(&updated_message()).await;

        assert_eq!(outcome, ForwardOutcome::Logged);
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_not_delivered() {
        let sink = Arc::new(RecordingSink::default());
        let fwd = forwarder(false, Arc::clone(&sink));

        let outcome = fwd
            .handle_message(&BusMessage::new(MUTATION_TOPIC, b"not json".to_vec()))
            .await;

        assert_eq!(outcome, ForwardOutcome::DecodeFailed);
        assert!(sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_is_reported_not_raised() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let fwd = forwarder(false, Arc::clone(&sink));

        let outcome = fwd.handle_message(&updated_message()).await;

        assert_eq!(outcome, ForwardOutcome::DeliveryFailed);
        assert_eq!(sink.sent.lock().len(), 1);
    }
}
