//! `todo-broadcaster` -- relays todo mutation events from the bus to a
//! chat webhook.
//!
//! # Environment variables
//!
//! | Variable                 | Required          | Default                    | Description                     |
//! |--------------------------|-------------------|----------------------------|---------------------------------|
//! | `NATS_URL`               | no                | `nats://nats-service:4222` | Bus address                     |
//! | `BUS_TOPIC`              | no                | `db-updates`               | Topic to relay                  |
//! | `DISCORD_WEBHOOK_URL`    | unless `LOG_ONLY` | --                         | Chat webhook endpoint           |
//! | `LOG_ONLY`               | no                | `false`                    | Log messages instead of posting |
//! | `BUS_RECONNECT_MAX_SECS` | no                | `30`                       | Backoff ceiling while waiting   |

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_broadcaster::config::BroadcasterConfig;
use todo_broadcaster::service;
use todo_events::NatsConnector;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_broadcaster=info,todo_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BroadcasterConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        bus_url = %config.bus_url,
        topic = %config.topic,
        log_only = config.log_only,
        "Starting todo-broadcaster",
    );

    let sink = service::build_sink(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create notification sink");
        std::process::exit(1);
    });

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    if let Err(e) = service::run(&NatsConnector::new(), &config, sink, cancel).await {
        tracing::error!(error = %e, "Broadcaster failed");
        std::process::exit(1);
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
