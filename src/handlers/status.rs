//! Service status and liveness handlers.

use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::server::AppState;
use crate::store::PendingSnapshot;

/// Service status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub active_tasks: usize,
    pub active_results: usize,
    pub uptime_secs: u64,
}

/// Service name, version and pending counts
pub async fn index(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let stats = state.store.stats();
    Json(StatusResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        active_tasks: stats.pending_tasks,
        active_results: stats.pending_results,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

/// Pending codes with truncated identifiers and their age
pub async fn debug(State(state): State<Arc<AppState>>) -> Json<PendingSnapshot> {
    Json(state.store.pending())
}

/// Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "ok": true,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}
