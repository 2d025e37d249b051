//! Discord-style chat webhook delivery.
//!
//! [`DiscordWebhook`] POSTs `{"content": text}` to the webhook URL.
//! Rate-limited responses (HTTP 429) are retried after the server-provided
//! `retry_after`. Network errors and 5xx responses are retried with
//! exponential backoff (1 s, 2 s, 4 s). Other 4xx responses fail at once.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{NotificationSink, SinkError};

/// Discord rejects message content longer than this many characters.
const MAX_CONTENT_CHARS: usize = 2000;

/// Wait used when a 429 carries no usable `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    /// The webhook kept rate limiting us.
    #[error("Webhook rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl WebhookError {
    /// Whether a backoff retry could plausibly succeed.
    fn is_transient(&self) -> bool {
        match self {
            WebhookError::Request(_) => true,
            WebhookError::HttpStatus(status) => *status >= 500,
            WebhookError::RateLimited { .. } => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Retry and timeout settings for [`DiscordWebhook`].
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Backoff before each retry after a transient failure.
    pub retry_delays: Vec<Duration>,
    /// How many times a 429 is waited out before giving up.
    pub max_rate_limit_retries: u32,
    /// Ceiling on a single server-requested wait.
    pub max_retry_after: Duration,
    /// HTTP request timeout for a single delivery attempt.
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            max_rate_limit_retries: 5,
            max_retry_after: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Body Discord sends with a 429.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

// ---------------------------------------------------------------------------
// DiscordWebhook
// ---------------------------------------------------------------------------

/// Delivers notification text to a chat webhook.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: String,
    config: WebhookConfig,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Result<Self, WebhookError> {
        Self::with_config(url, WebhookConfig::default())
    }

    pub fn with_config(url: impl Into<String>, config: WebhookConfig) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            config,
        })
    }

    /// Deliver `text`, waiting out rate limits and retrying transient
    /// failures. Returns `Ok(())` on the first successful attempt.
    pub async fn deliver(&self, text: &str) -> Result<(), WebhookError> {
        let payload = serde_json::json!({ "content": truncate_content(text) });

        let mut transient_failures = 0usize;
        let mut rate_limited = 0u32;

        loop {
            let err = match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if let WebhookError::RateLimited { retry_after } = &err {
                if rate_limited < self.config.max_rate_limit_retries {
                    rate_limited += 1;
                    let wait = (*retry_after).min(self.config.max_retry_after);
                    tracing::warn!(
                        attempt = rate_limited,
                        wait_ms = wait.as_millis() as u64,
                        "Webhook rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
            } else if err.is_transient() {
                if let Some(delay) = self.config.retry_delays.get(transient_failures) {
                    transient_failures += 1;
                    tracing::warn!(
                        attempt = transient_failures,
                        error = %err,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                    continue;
                }
            }

            tracing::error!(error = %err, "Webhook delivery failed");
            return Err(err);
        }
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok());
            let body_secs = response
                .json::<RateLimitBody>()
                .await
                .ok()
                .map(|b| b.retry_after);

            return Err(WebhookError::RateLimited {
                retry_after: retry_after_duration(body_secs.or(header_secs)),
            });
        }

        Err(WebhookError::HttpStatus(status.as_u16()))
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn send(&self, text: &str) -> Result<(), SinkError> {
        Ok(self.deliver(text).await?)
    }
}

fn retry_after_duration(secs: Option<f64>) -> Duration {
    match secs {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            Duration::try_from_secs_f64(secs).unwrap_or(DEFAULT_RETRY_AFTER)
        }
        _ => DEFAULT_RETRY_AFTER,
    }
}

/// Clip `text` to the webhook's content limit, marking the cut with `…`.
fn truncate_content(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return Cow::Borrowed(text);
    }
    let mut clipped: String = text.chars().take(MAX_CONTENT_CHARS - 1).collect();
    clipped.push('…');
    Cow::Owned(clipped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
