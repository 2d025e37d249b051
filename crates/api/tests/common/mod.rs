#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use async_trait::async_trait;
use todo_api::config::ServerConfig;
use todo_api::router::build_app_router;
use todo_api::state::AppState;
use todo_db::models::todo::{CreateTodo, Todo};
use todo_db::{DbPool, StoreError, TodoStore};
use todo_events::{BridgeConfig, EventBridge, MemoryBus};

/// Store whose every operation fails as if the database were down.
///
/// Accepts any non-empty id so requests reach the write.
pub struct UnavailableStore;

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

#[async_trait]
impl TodoStore for UnavailableStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        Err(unavailable())
    }

    async fn insert(&self, _input: CreateTodo) -> Result<Todo, StoreError> {
        Err(unavailable())
    }

    async fn set_done(&self, _id: &str, _done: bool) -> Result<Option<Todo>, StoreError> {
        Err(unavailable())
    }

    fn is_valid_id(&self, id: &str) -> bool {
        !id.is_empty()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8080".to_string()],
        request_timeout_secs: 30,
    }
}

/// Bridge settings short enough that a broken test fails fast.
pub fn test_bridge_config() -> BridgeConfig {
    BridgeConfig {
        bus_url: "memory://".into(),
        publish_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_millis(500),
        shutdown_grace: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Build the full application router over a fresh in-memory store, with
/// the event bridge publishing onto `bus`.
///
/// Uses [`build_app_router`] so tests exercise the same middleware stack
/// that production uses.
pub fn build_test_app(bus: &MemoryBus) -> Router {
    build_test_app_with_store(bus, todo_db::memory_pool())
}

/// Same as [`build_test_app`] over a caller-provided store.
pub fn build_test_app_with_store(bus: &MemoryBus, pool: DbPool) -> Router {
    let config = test_config();
    let bridge = EventBridge::start(bus.clone(), test_bridge_config())
        .expect("event bridge should start");

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        bridge: Arc::new(bridge),
    };

    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, Method::PUT, uri, body).await
}

pub async fn post_form(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
