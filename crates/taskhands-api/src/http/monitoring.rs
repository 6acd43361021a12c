//! Health and liveness handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting work.
    Healthy,
    /// Shutting down; control operations are refused.
    Draining,
}

/// Worker pool snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealth {
    pub max_workers: usize,
    pub active: usize,
    pub pending: usize,
    pub completed: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    /// Tasks with a registered schedule.
    pub running_tasks: usize,
    pub pool: PoolHealth,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let scheduler = &state.scheduler;
    let pool = scheduler.pool();

    let status = if scheduler.is_shutting_down() {
        HealthStatus::Draining
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
        running_tasks: scheduler.running_count(),
        pool: PoolHealth {
            max_workers: pool.max_workers(),
            active: pool.active(),
            pending: pool.pending(),
            completed: pool.total_completed(),
        },
    })
}

/// GET /livez
pub async fn liveness_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}
