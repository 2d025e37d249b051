//! Mutation mirroring pipeline.
//!
//! This crate carries todo mutation events from the backend to the chat
//! webhook:
//!
//! - [`transport`]: the bus contract ([`BusConnector`], [`BusConnection`])
//!   with a NATS implementation and an in-process [`MemoryBus`].
//! - [`EventBridge`]: actor thread that owns the bus connection and gives
//!   synchronous callers a bounded, blocking `publish`.
//! - [`EventForwarder`]: subscriber loop relaying bus messages to a
//!   [`NotificationSink`].
//! - [`delivery`]: outbound sinks (Discord-style webhook, log-only).
//! - [`reconnect`]: exponential backoff shared by the bridge and the
//!   broadcaster.

pub mod bridge;
pub mod delivery;
pub mod forwarder;
pub mod reconnect;
pub mod transport;

pub use bridge::{BridgeConfig, BridgeError, BridgeState, EventBridge, PublishError};
pub use delivery::webhook::{DiscordWebhook, WebhookConfig, WebhookError};
pub use delivery::log::LogSink;
pub use delivery::{NotificationSink, SinkError};
pub use forwarder::{EventForwarder, ForwardOutcome, ForwarderConfig, ForwarderError, SubscriptionState};
pub use reconnect::ReconnectConfig;
pub use transport::memory::MemoryBus;
pub use transport::nats::NatsConnector;
pub use transport::{BusConnection, BusConnector, BusMessage, BusSubscription, TransportError};
