//! Liveness and readiness endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_nats::connection::State;
use async_trait::async_trait;
use axum::{extract::Extension, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// How long `/ready` waits for each dependency.
const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// A backing service that must be reachable for the server to be ready.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Short name reported when the check fails.
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

/// Checks that the NATS client currently holds a connection.
pub struct NatsReadiness {
    client: async_nats::Client,
}

impl NatsReadiness {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadinessCheck for NatsReadiness {
    fn name(&self) -> &'static str {
        "nats"
    }

    async fn check(&self) -> Result<(), String> {
        match self.client.connection_state() {
            State::Connected => Ok(()),
            other => Err(format!("connection state is {other:?}")),
        }
    }
}

/// Round-trips a trivial query to ClickHouse.
pub struct ClickHouseReadiness {
    client: clickhouse::Client,
}

impl ClickHouseReadiness {
    pub fn new(client: clickhouse::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadinessCheck for ClickHouseReadiness {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn check(&self) -> Result<(), String> {
        eventline_db::ping(&self.client)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Handler for `GET /health`.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `GET /ready`.
///
/// Runs the checks in order and reports the first dependency that fails.
pub async fn ready(Extension(state): Extension<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    for dependency in &state.readiness {
        let outcome = tokio::time::timeout(READINESS_TIMEOUT, dependency.check())
            .await
            .unwrap_or_else(|_| Err("timed out".to_string()));

        if let Err(reason) = outcome {
            tracing::warn!(dependency = dependency.name(), "readiness check failed: {}", reason);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "error": format!("{} unavailable", dependency.name())
                })),
            );
        }
    }

    (StatusCode::OK, Json(json!({ "status": "ready" })))
}
