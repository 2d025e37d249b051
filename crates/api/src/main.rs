use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_api::config::ServerConfig;
use todo_api::router::build_app_router;
use todo_api::state::AppState;
use todo_events::{BridgeConfig, EventBridge, NatsConnector};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_api=debug,todo_events=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let bridge_config = BridgeConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        bus_url = %bridge_config.bus_url,
        topic = %bridge_config.topic,
        "Loaded server configuration"
    );

    // --- Store ---
    let store_config = todo_db::StoreConfig::from_env();
    let pool = todo_db::create_pool(&store_config).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create todo store");
        std::process::exit(1);
    });
    // An unreachable store is reported by /healthz; keep serving.
    match todo_db::health_check(&pool).await {
        Ok(()) => tracing::info!("Todo store health check passed"),
        Err(e) => tracing::error!(error = %e, "Todo store health check failed"),
    }

    // --- Event bridge ---
    // `start` blocks until the first connect attempt resolves.
    let connector = NatsConnector::new().with_connect_timeout(bridge_config.connect_timeout);
    let bridge = match tokio::task::spawn_blocking(move || {
        EventBridge::start(connector, bridge_config)
    })
    .await
    {
        Ok(Ok(bridge)) => Arc::new(bridge),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to start event bridge");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Event bridge startup task failed");
            std::process::exit(1);
        }
    };
    tracing::info!(state = ?bridge.state(), "Event bridge running");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        bridge: Arc::clone(&bridge),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = config.socket_addr().unwrap_or_else(|e| {
        tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
        std::process::exit(1);
    });
    tracing::info!(%addr, "Starting todo backend");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!(%addr, error = %e, "Failed to bind to address");
        std::process::exit(1);
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Drains in-flight publishes for at most the shutdown grace period.
    let stopper = Arc::clone(&bridge);
    if let Err(e) = tokio::task::spawn_blocking(move || stopper.stop()).await {
        tracing::error!(error = %e, "Event bridge shutdown task failed");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. Docker, Kubernetes).
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
