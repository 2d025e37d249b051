//! Sink that writes notifications to the log instead of the network.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{NotificationSink, SinkError};

/// Logs every notification at `info`. Never fails, never touches the
/// network. Used for log-only deployments.
#[derive(Debug, Default)]
pub struct LogSink {
    logged: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications written so far.
    pub fn logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, text: &str) -> Result<(), SinkError> {
        self.logged.fetch_add(1, Ordering::Relaxed);
        tracing::info!(%text, "Notification (log-only)");
        Ok(())
    }
}
