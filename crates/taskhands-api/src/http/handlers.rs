//! Task route handlers.
//!
//! - GET  /tasks                 - List tasks with running state
//! - GET  /tasks/{key}           - Get one task
//! - PUT  /tasks/{key}           - Replace a task's descriptor
//! - POST /tasks/{key}/start     - Start the schedule
//! - POST /tasks/{key}/stop      - Stop the schedule
//! - POST /tasks/{key}/restart   - Restart with the current descriptor
//! - POST /tasks/{key}/try-once  - Run once now
//! - GET  /tasks/{key}/running   - Running flag

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskhands_core::{JobParams, TaskDescriptor, TaskView};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Response for listing tasks.
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub count: usize,
    pub tasks: Vec<TaskView>,
}

/// Response for start/stop/restart/try-once.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub key: String,
    pub result: bool,
}

/// Response for the running flag.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunningResponse {
    pub key: String,
    pub running: bool,
}

/// Optional body of a try-once request.
#[derive(Debug, Default, Deserialize)]
pub struct TryOnceRequest {
    #[serde(default)]
    pub params: Option<JobParams>,
}

/// GET /tasks
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let tasks = state.scheduler.list_tasks().await?;
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

/// GET /tasks/{key}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(state.scheduler.task(&key).await?))
}

/// PUT /tasks/{key}
///
/// The path key wins over any `key` in the body. The new schedule is
/// validated but not applied until the task is restarted.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<TaskDescriptor>, ApiError> {
    let mut value: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?;
    let Some(object) = value.as_object_mut() else {
        return Err(ApiError::BadRequest(
            "descriptor body must be a JSON object".to_string(),
        ));
    };
    object.insert("key".to_string(), Value::String(key.clone()));

    let descriptor: TaskDescriptor = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("invalid descriptor: {}", e)))?;

    // Unknown keys report 404 even when the schedule is also bad
    state.scheduler.task(&key).await?;
    descriptor.validate()?;
    state.scheduler.check_schedule(&descriptor)?;
    state.scheduler.update_descriptor(descriptor.clone()).await?;
    info!(task = %key, cron = %descriptor.cron, "Descriptor updated via HTTP");

    Ok(Json(descriptor))
}

/// POST /tasks/{key}/start
pub async fn start_task(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    info!(task = %key, "Start requested");
    let result = state.scheduler.start(&key).await?;
    Ok(Json(ActionResponse { key, result }))
}

/// POST /tasks/{key}/stop
pub async fn stop_task(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    info!(task = %key, "Stop requested");
    let result = state.scheduler.stop(&key).await?;
    Ok(Json(ActionResponse { key, result }))
}

/// POST /tasks/{key}/restart
pub async fn restart_task(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    info!(task = %key, "Restart requested");
    let result = state.scheduler.restart(&key).await?;
    Ok(Json(ActionResponse { key, result }))
}

/// POST /tasks/{key}/try-once
///
/// Body is optional: `{"params": {...}}` overrides the descriptor params for
/// this run.
pub async fn try_once(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<ActionResponse>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TryOnceRequest::default()
    } else {
        serde_json::from_slice::<TryOnceRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid try-once body: {}", e)))?
    };

    info!(task = %key, custom_params = request.params.is_some(), "Manual run requested");
    let result = state.scheduler.try_once(&key, request.params).await?;
    Ok(Json(ActionResponse { key, result }))
}

/// GET /tasks/{key}/running
pub async fn task_running(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<RunningResponse> {
    let running = state.scheduler.is_running(&key);
    Json(RunningResponse { key, running })
}
