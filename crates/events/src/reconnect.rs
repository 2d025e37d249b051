//! Backoff pacing for bus (re)connection.
//!
//! [`Backoff`] yields a growing, capped sequence of waits. The bridge
//! steps it between background reconnect attempts while degraded; the
//! broadcaster drives it through [`connect_with_backoff`] at startup.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::transport::{BusConnection, BusConnector};

/// Exponential backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Ceiling for any single wait.
    pub max_delay: Duration,
    /// Growth factor applied after every failed attempt.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            config: self.clone(),
            current: self.initial_delay,
        }
    }
}

/// Stateful delay sequence: `initial, initial * m, initial * m², ...`
/// capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
}

impl Backoff {
    /// Return the wait to use now and advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.config.max_delay);
        let grown = delay.as_secs_f64() * self.config.multiplier;
        self.current = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);
        delay
    }

    /// Start over from `initial_delay`.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Keep connecting to `address` until it works or `cancel` fires.
///
/// Returns `None` only when cancelled.
pub async fn connect_with_backoff(
    connector: &dyn BusConnector,
    address: &str,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<Box<dyn BusConnection>> {
    let mut backoff = config.backoff();

    for attempt in 1u32.. {
        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = connector.connect(address) => Some(result),
        };
        let Some(result) = result else {
            break;
        };

        let wait = match result {
            Ok(connection) => {
                tracing::info!(address, attempt, "Connected to bus");
                return Some(connection);
            }
            Err(e) => {
                let wait = backoff.next_delay();
                tracing::warn!(
                    address,
                    attempt,
                    error = %e,
                    retry_in_ms = wait.as_millis() as u64,
                    "Bus connect attempt failed"
                );
                wait
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::info!(address, "Bus connect cancelled");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBus;

    fn secs(delays: impl Iterator<Item = Duration>) -> Vec<u64> {
        delays.map(|d| d.as_secs()).collect()
    }

    #[test]
    fn default_sequence_doubles_up_to_ceiling() {
        let backoff = ReconnectConfig::default().backoff();
        assert_eq!(secs(backoff.take(8)), [1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = ReconnectConfig::default().backoff();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn initial_delay_above_ceiling_is_clamped() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(50),
            max_delay: Duration::from_secs(10),
            multiplier: 3.0,
        };
        assert_eq!(secs(config.backoff().take(2)), [10, 10]);
    }

    #[tokio::test]
    async fn returns_none_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let bus = MemoryBus::offline();
        let connection =
            connect_with_backoff(&bus, "memory://", &ReconnectConfig::default(), &cancel).await;
        assert!(connection.is_none());
    }

    #[tokio::test]
    async fn keeps_trying_until_bus_is_reachable() {
        let bus = MemoryBus::offline();
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        };

        let flipper = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flipper.set_online(true);
        });

        let cancel = CancellationToken::new();
        let connection = tokio::time::timeout(
            Duration::from_secs(5),
            connect_with_backoff(&bus, "memory://", &config, &cancel),
        )
        .await
        .expect("should connect before the timeout");
        assert!(connection.is_some_and(|c| c.is_connected()));
    }
}
