use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use todo_events::BridgeState;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the document store is reachable.
    pub store_healthy: bool,
    /// Current event bridge state. Informational only.
    pub bus_state: BridgeState,
}

/// GET / -- service banner.
async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Todo Backend API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /healthz -- 200 while the store is reachable, 500 otherwise.
///
/// A degraded bus never fails the health check; mirroring is best-effort.
async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_healthy = match todo_db::health_check(&state.pool).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            false
        }
    };

    let (code, status) = if store_healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            store_healthy,
            bus_state: state.bridge.state(),
        }),
    )
}

/// Mount index and health routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
}
