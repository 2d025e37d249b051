//! Broadcaster run loop.
//!
//! Waits for the bus, subscribes through an [`EventForwarder`], and
//! resubscribes with backoff whenever the subscription is lost. Returns
//! once cancelled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use todo_events::reconnect::connect_with_backoff;
use todo_events::{
    BusConnector, DiscordWebhook, EventForwarder, ForwarderConfig, ForwarderError, LogSink,
    NotificationSink, WebhookError,
};

use crate::config::BroadcasterConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to build webhook client: {0}")]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}

/// Build the notification sink the configuration asks for.
///
/// Log-only mode yields a [`LogSink`] whether or not a webhook URL is set.
/// Without log-only mode and without a URL there is no sink.
pub fn build_sink(
    config: &BroadcasterConfig,
) -> Result<Option<Arc<dyn NotificationSink>>, ServiceError> {
    if config.log_only {
        return Ok(Some(Arc::new(LogSink::new())));
    }
    match &config.webhook_url {
        Some(url) => {
            let webhook = DiscordWebhook::new(url.clone())?;
            Ok(Some(Arc::new(webhook)))
        }
        None => Ok(None),
    }
}

/// Relay bus messages until `cancel` fires.
pub async fn run(
    connector: &dyn BusConnector,
    config: &BroadcasterConfig,
    sink: Option<Arc<dyn NotificationSink>>,
    cancel: CancellationToken,
) -> Result<(), ServiceError> {
    let forwarder = EventForwarder::new(
        ForwarderConfig {
            topic: config.topic.clone(),
            // A supplied sink (the LogSink in log-only mode) does the logging.
            log_only: config.log_only && sink.is_none(),
        },
        sink,
    )?;

    loop {
        let Some(connection) =
            connect_with_backoff(connector, &config.bus_url, &config.reconnect, &cancel).await
        else {
            break;
        };

        match forwarder.run(connection.as_ref(), cancel.clone()).await {
            Ok(()) if cancel.is_cancelled() => break,
            Ok(()) => tracing::warn!("Subscription lost, reconnecting"),
            Err(e) => tracing::warn!(error = %e, "Subscribe failed, reconnecting"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect.initial_delay) => {}
        }
    }

    tracing::info!("Broadcaster stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use todo_core::events::MutationEvent;
    use todo_core::topics::MUTATION_TOPIC;
    use todo_events::{BusConnection, MemoryBus, ReconnectConfig, SinkError};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, text: &str) -> Result<(), SinkError> {
            self.sent.lock().push(text.to_string());
            Ok(())
        }
    }

    fn config(log_only: bool) -> BroadcasterConfig {
        BroadcasterConfig {
            bus_url: "memory://".into(),
            topic: MUTATION_TOPIC.into(),
            webhook_url: (!log_only).then(|| "http://127.0.0.1:1/hook".to_string()),
            log_only,
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
            },
        }
    }

    /// Publish until the sink records something; the forwarder subscribes
    /// asynchronously so early publishes may be missed.
    async fn publish_until_delivered(bus: &MemoryBus, sink: &RecordingSink) {
        let payload = MutationEvent::created("1").with_field("task", "t").encode();
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.sent.lock().is_empty() {
                let _ = bus.connection().publish(MUTATION_TOPIC, payload.clone()).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("message was not delivered in time");
    }

    #[tokio::test]
    async fn log_only_builds_log_sink() {
        let sink = build_sink(&config(true)).unwrap().expect("log-only sink");

        // No webhook server exists in tests; only a LogSink can succeed here.
        sink.send("Received on [db-updates]: {}").await.unwrap();
    }

    #[test]
    fn webhook_url_builds_sink() {
        assert!(build_sink(&config(false)).unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_sink_is_rejected() {
        let result = run(
            &MemoryBus::default(),
            &config(false),
            None,
            CancellationToken::new(),
        )
        .await;
        assert_matches!(result, Err(ServiceError::Forwarder(ForwarderError::MissingSink)));
    }

    #[tokio::test]
    async fn relays_once_bus_comes_online() {
        let bus = MemoryBus::offline();
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let bus = bus.clone();
            let sink = Arc::clone(&sink) as Arc<dyn NotificationSink>;
            let cancel = cancel.clone();
            async move { run(&bus, &config(false), Some(sink), cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.set_online(true);
        publish_until_delivered(&bus, &sink).await;

        assert!(sink.sent.lock()[0].starts_with("Received on [db-updates]: NEW TODO: "));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn log_only_run_hands_messages_to_supplied_sink() {
        let bus = MemoryBus::default();
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let bus = bus.clone();
            let sink = Arc::clone(&sink) as Arc<dyn NotificationSink>;
            let cancel = cancel.clone();
            async move { run(&bus, &config(true), Some(sink), cancel).await }
        });

        publish_until_delivered(&bus, &sink).await;

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_bus_returns() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { run(&MemoryBus::offline(), &config(true), None, cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("run should return after cancel")
            .unwrap()
            .unwrap();
    }
}
