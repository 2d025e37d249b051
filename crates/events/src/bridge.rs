//! Synchronous-to-bus event bridge.
//!
//! [`EventBridge`] owns a dedicated OS thread running a single-threaded
//! tokio runtime. The actor loop on that thread is the only code that ever
//! touches the bus connection. Request threads call the blocking
//! [`EventBridge::publish`], which enqueues a command and waits for the
//! actor's answer for at most [`BridgeConfig::publish_timeout`].
//!
//! Publishing is best-effort and at-most-once: failures are logged and
//! returned, never retried.
//!
//! ```text
//! request thread ──publish()──► command queue ──► actor loop ──► bus
//!        ▲                                           │
//!        └──────────── reply (bounded wait) ◄────────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use todo_core::events::MutationEvent;
use todo_core::topics::MUTATION_TOPIC;

use crate::reconnect::{Backoff, ReconnectConfig};
use crate::transport::{BusConnection, BusConnector, TransportError};

/// Default bus address when `NATS_URL` is unset.
pub const DEFAULT_BUS_URL: &str = "nats://nats-service:4222";

/// Default number of publish commands that may wait for the actor.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Extra time granted to the initial connect before `start` stops waiting.
const START_WAIT_MARGIN: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Event bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bus address handed to the connector.
    pub bus_url: String,
    /// Topic every mutation is published to.
    pub topic: String,
    /// Upper bound on how long `publish` blocks its caller.
    pub publish_timeout: Duration,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// How long `stop` waits for in-flight publishes to drain.
    pub shutdown_grace: Duration,
    /// Capacity of the command queue in front of the actor.
    pub queue_capacity: usize,
    /// Backoff used while degraded.
    pub reconnect: ReconnectConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bus_url: DEFAULT_BUS_URL.into(),
            topic: MUTATION_TOPIC.into(),
            publish_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                      |
    /// |----------------------------|------------------------------|
    /// | `NATS_URL`                 | `nats://nats-service:4222`   |
    /// | `BUS_TOPIC`                | `db-updates`                 |
    /// | `PUBLISH_TIMEOUT_SECS`     | `5`                          |
    /// | `BUS_CONNECT_TIMEOUT_SECS` | `5`                          |
    /// | `BUS_SHUTDOWN_GRACE_SECS`  | `5`                          |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bus_url: std::env::var("NATS_URL").unwrap_or(defaults.bus_url),
            topic: std::env::var("BUS_TOPIC").unwrap_or(defaults.topic),
            publish_timeout: env_secs("PUBLISH_TIMEOUT_SECS").unwrap_or(defaults.publish_timeout),
            connect_timeout: env_secs("BUS_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout),
            shutdown_grace: env_secs("BUS_SHUTDOWN_GRACE_SECS").unwrap_or(defaults.shutdown_grace),
            ..defaults
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring non-numeric duration");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of the bridge's bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BridgeState {
    Uninitialized = 0,
    Connecting = 1,
    Ready = 2,
    Degraded = 3,
    Closed = 4,
}

impl BridgeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BridgeState::Uninitialized,
            1 => BridgeState::Connecting,
            2 => BridgeState::Ready,
            3 => BridgeState::Degraded,
            _ => BridgeState::Closed,
        }
    }
}

/// State cell shared between the handle and the actor thread.
#[derive(Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: BridgeState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> BridgeState {
        BridgeState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: BridgeState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single publish did not reach the bus.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The bridge is not `Ready`; nothing was enqueued.
    #[error("Event bridge unavailable (state: {0:?})")]
    Unavailable(BridgeState),

    /// Too many publishes are already waiting for the actor.
    #[error("Event bridge queue is full")]
    QueueFull,

    /// No acknowledgement within the timeout. Outcome unknown; treat as lost.
    #[error("Publish not acknowledged within {0:?}")]
    Timeout(Duration),

    /// The transport rejected the write.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The actor dropped the command without answering (shutdown).
    #[error("Publish dropped by event bridge")]
    Dropped,
}

/// Failure to bring up the bridge's execution context.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn event bridge: {0}")]
    Spawn(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// EventBridge
// ---------------------------------------------------------------------------

struct PublishCommand {
    payload: Vec<u8>,
    deadline: Instant,
    reply: std_mpsc::SyncSender<Result<(), TransportError>>,
}

struct Worker {
    handle: JoinHandle<()>,
    done: std_mpsc::Receiver<()>,
}

/// Thread-safe handle onto the bridge actor.
///
/// Share it via `Arc<EventBridge>`. Dropping the last handle stops the
/// bridge.
pub struct EventBridge {
    commands: mpsc::Sender<PublishCommand>,
    state: SharedState,
    publish_timeout: Duration,
    shutdown_grace: Duration,
    cancel: CancellationToken,
    worker: Mutex<Option<Worker>>,
}

impl EventBridge {
    /// Spawn the actor thread and attempt the initial bus connection.
    ///
    /// Returns once that attempt resolved. An unreachable bus leaves the
    /// bridge `Degraded`, not failed; only a failure to create the thread or
    /// its runtime is an error.
    pub fn start(
        connector: impl BusConnector,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let state = SharedState::new(BridgeState::Uninitialized);
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<()>(1);
        let (done_tx, done_rx) = std_mpsc::sync_channel::<()>(1);

        let publish_timeout = config.publish_timeout;
        let shutdown_grace = config.shutdown_grace;
        let start_wait = config.connect_timeout + START_WAIT_MARGIN;

        let actor = BridgeActor {
            connector: Box::new(connector),
            backoff: config.reconnect.backoff(),
            config,
            connection: None,
            state: state.clone(),
            commands: commands_rx,
            cancel: cancel.clone(),
            next_retry: None,
        };

        let handle = std::thread::Builder::new()
            .name("event-bridge".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut actor = actor;
                    actor.connect_initial().await;
                    let _ = ready_tx.send(());
                    actor.run().await;
                });
                let _ = done_tx.send(());
            })?;

        if ready_rx.recv_timeout(start_wait).is_err() {
            tracing::warn!(
                state = ?state.get(),
                "Event bridge still connecting after the start timeout"
            );
        }

        tracing::info!(state = ?state.get(), "Event bridge started");

        Ok(Self {
            commands: commands_tx,
            state,
            publish_timeout,
            shutdown_grace,
            cancel,
            worker: Mutex::new(Some(Worker {
                handle,
                done: done_rx,
            })),
        })
    }

    pub fn state(&self) -> BridgeState {
        self.state.get()
    }

    /// Publish a mutation event, blocking for at most the publish timeout.
    ///
    /// Returns immediately with [`PublishError::Unavailable`] unless the
    /// bridge is `Ready`. `Ok` means the transport acknowledged the write.
    /// Must not be called from an async worker thread; use
    /// `tokio::task::spawn_blocking` there.
    pub fn publish(&self, event: &MutationEvent) -> Result<(), PublishError> {
        let result = self.try_publish(event);

        match &result {
            Ok(()) => {
                tracing::debug!(id = %event.id, action = ?event.action, "Mutation event published");
            }
            Err(e) => {
                tracing::warn!(
                    id = %event.id,
                    action = ?event.action,
                    error = %e,
                    "Mutation event not published"
                );
            }
        }

        result
    }

    fn try_publish(&self, event: &MutationEvent) -> Result<(), PublishError> {
        let state = self.state.get();
        if state != BridgeState::Ready {
            return Err(PublishError::Unavailable(state));
        }

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        let command = PublishCommand {
            payload: event.encode(),
            deadline: Instant::now() + self.publish_timeout,
            reply: reply_tx,
        };

        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::Unavailable(BridgeState::Closed),
        })?;

        match reply_rx.recv_timeout(self.publish_timeout) {
            Ok(result) => result.map_err(PublishError::from),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                Err(PublishError::Timeout(self.publish_timeout))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(PublishError::Dropped),
        }
    }

    /// Stop the actor, letting queued publishes drain for at most the
    /// shutdown grace period. Idempotent.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        tracing::info!("Stopping event bridge");
        self.cancel.cancel();

        match worker.done.recv_timeout(self.shutdown_grace) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::error!("Event bridge thread panicked");
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "Event bridge did not drain in time, detaching"
                );
            }
        }

        self.state.set(BridgeState::Closed);
        tracing::info!("Event bridge stopped");
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Loop running on the bridge thread. Sole owner of the connection.
struct BridgeActor {
    connector: Box<dyn BusConnector>,
    config: BridgeConfig,
    connection: Option<Box<dyn BusConnection>>,
    state: SharedState,
    commands: mpsc::Receiver<PublishCommand>,
    cancel: CancellationToken,
    backoff: Backoff,
    next_retry: Option<Instant>,
}

impl BridgeActor {
    async fn connect_initial(&mut self) {
        self.state.set(BridgeState::Connecting);

        match self.try_connect().await {
            Ok(conn) => {
                self.connection = Some(conn);
                self.state.set(BridgeState::Ready);
                tracing::info!(bus_url = %self.config.bus_url, "Event bridge connected");
            }
            Err(e) => {
                tracing::error!(
                    bus_url = %self.config.bus_url,
                    error = %e,
                    "Bus unreachable, event bridge degraded"
                );
                self.enter_degraded();
            }
        }
    }

    async fn run(&mut self) {
        loop {
            let retry_at = self.next_retry;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = sleep_until_opt(retry_at) => self.recover().await,
            }
        }

        self.drain().await;
    }

    /// Finish whatever is already queued, then close.
    async fn drain(&mut self) {
        self.commands.close();

        let mut drained = 0usize;
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
            drained += 1;
        }

        self.connection = None;
        self.state.set(BridgeState::Closed);
        tracing::info!(drained, "Event bridge actor exited");
    }

    async fn handle(&mut self, command: PublishCommand) {
        let PublishCommand {
            payload,
            deadline,
            reply,
        } = command;

        if Instant::now() >= deadline {
            tracing::debug!("Discarding publish whose caller already gave up");
            return;
        }

        let result = match &self.connection {
            Some(conn) if self.state.get() == BridgeState::Ready && conn.is_connected() => {
                match tokio::time::timeout_at(deadline, conn.publish(&self.config.topic, payload))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout),
                }
            }
            _ => Err(TransportError::NotConnected),
        };

        if result.is_err() && self.state.get() == BridgeState::Ready {
            let connected = self.connection.as_ref().is_some_and(|c| c.is_connected());
            if !connected {
                tracing::warn!("Bus connection lost, event bridge degraded");
                self.enter_degraded();
            }
        }

        // The caller may have timed out and dropped its receiver.
        let _ = reply.try_send(result);
    }

    async fn try_connect(&self) -> Result<Box<dyn BusConnection>, TransportError> {
        tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.config.bus_url),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
    }

    fn enter_degraded(&mut self) {
        self.state.set(BridgeState::Degraded);
        self.backoff.reset();
        self.next_retry = Some(Instant::now() + self.backoff.next_delay());
    }

    /// One reconnect tick while degraded.
    async fn recover(&mut self) {
        let recovered = match &self.connection {
            // The transport reconnects on its own; wait for it.
            Some(conn) => conn.is_connected(),
            None => match self.try_connect().await {
                Ok(conn) => {
                    self.connection = Some(conn);
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Event bridge reconnect failed");
                    false
                }
            },
        };

        if recovered {
            self.next_retry = None;
            self.state.set(BridgeState::Ready);
            tracing::info!("Event bridge connection restored");
            return;
        }

        let wait = self.backoff.next_delay();
        tracing::debug!(retry_in_ms = wait.as_millis() as u64, "Event bridge still degraded");
        self.next_retry = Some(Instant::now() + wait);
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
