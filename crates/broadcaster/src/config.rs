use std::time::Duration;

use todo_core::topics::MUTATION_TOPIC;
use todo_events::bridge::DEFAULT_BUS_URL;
use todo_events::ReconnectConfig;

/// Broadcaster configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DISCORD_WEBHOOK_URL is required unless LOG_ONLY is enabled")]
    MissingWebhookUrl,

    #[error("{key} must be a number of seconds, got '{value}'")]
    InvalidDuration { key: &'static str, value: String },
}

/// Broadcaster configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Bus address.
    pub bus_url: String,
    /// Topic to relay.
    pub topic: String,
    /// Chat webhook URL. `None` only in log-only mode.
    pub webhook_url: Option<String>,
    /// Log messages instead of posting them.
    pub log_only: bool,
    /// Backoff while waiting for the bus.
    pub reconnect: ReconnectConfig,
}

impl BroadcasterConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Required            | Default                    |
    /// |----------------------------|---------------------|----------------------------|
    /// | `NATS_URL`                 | no                  | `nats://nats-service:4222` |
    /// | `BUS_TOPIC`                | no                  | `db-updates`               |
    /// | `DISCORD_WEBHOOK_URL`      | unless `LOG_ONLY`   | --                         |
    /// | `LOG_ONLY`                 | no                  | `false`                    |
    /// | `BUS_RECONNECT_MAX_SECS`   | no                  | `30`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_only = lookup("LOG_ONLY").as_deref().is_some_and(is_enabled);
        let webhook_url = lookup("DISCORD_WEBHOOK_URL").filter(|url| !url.trim().is_empty());

        if webhook_url.is_none() && !log_only {
            return Err(ConfigError::MissingWebhookUrl);
        }

        let mut reconnect = ReconnectConfig::default();
        if let Some(raw) = lookup("BUS_RECONNECT_MAX_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidDuration {
                key: "BUS_RECONNECT_MAX_SECS",
                value: raw.clone(),
            })?;
            reconnect.max_delay = Duration::from_secs(secs).max(reconnect.initial_delay);
        }

        Ok(Self {
            bus_url: lookup("NATS_URL").unwrap_or_else(|| DEFAULT_BUS_URL.into()),
            topic: lookup("BUS_TOPIC").unwrap_or_else(|| MUTATION_TOPIC.into()),
            webhook_url,
            log_only,
            reconnect,
        })
    }
}

fn is_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_webhook_set() {
        let config =
            BroadcasterConfig::from_lookup(lookup(&[("DISCORD_WEBHOOK_URL", "https://hook")]))
                .unwrap();

        assert_eq!(config.bus_url, "nats://nats-service:4222");
        assert_eq!(config.topic, "db-updates");
        assert_eq!(config.webhook_url.as_deref(), Some("https://hook"));
        assert!(!config.log_only);
    }

    #[test]
    fn webhook_is_required_outside_log_only() {
        let result = BroadcasterConfig::from_lookup(lookup(&[]));
        assert_matches!(result, Err(ConfigError::MissingWebhookUrl));

        let result = BroadcasterConfig::from_lookup(lookup(&[("DISCORD_WEBHOOK_URL", "  ")]));
        assert_matches!(result, Err(ConfigError::MissingWebhookUrl));
    }

    #[test]
    fn log_only_needs_no_webhook() {
        for value in ["1", "true", "YES", "on"] {
            let config = BroadcasterConfig::from_lookup(lookup(&[("LOG_ONLY", value)])).unwrap();
            assert!(config.log_only, "LOG_ONLY={value}");
            assert!(config.webhook_url.is_none());
        }
    }

    #[test]
    fn falsy_log_only_still_requires_webhook() {
        let result = BroadcasterConfig::from_lookup(lookup(&[("LOG_ONLY", "no")]));
        assert_matches!(result, Err(ConfigError::MissingWebhookUrl));
    }

    #[test]
    fn overrides_are_read() {
        let config = BroadcasterConfig::from_lookup(lookup(&[
            ("LOG_ONLY", "true"),
            ("NATS_URL", "nats://localhost:4222"),
            ("BUS_TOPIC", "other"),
            ("BUS_RECONNECT_MAX_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.bus_url, "nats://localhost:4222");
        assert_eq!(config.topic, "other");
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn invalid_reconnect_ceiling_is_rejected() {
        let result = BroadcasterConfig::from_lookup(lookup(&[
            ("LOG_ONLY", "1"),
            ("BUS_RECONNECT_MAX_SECS", "soon"),
        ]));
        assert_matches!(
            result,
            Err(ConfigError::InvalidDuration { key: "BUS_RECONNECT_MAX_SECS", .. })
        );
    }
}
