//! HTTP route definitions.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::http::{handlers, monitoring};
use crate::state::AppState;

/// Create the router.
///
/// ```text
/// /tasks
///   GET    /tasks                  - List tasks
///   GET    /tasks/{key}            - Get task
///   PUT    /tasks/{key}            - Update descriptor
///   POST   /tasks/{key}/start      - Start schedule
///   POST   /tasks/{key}/stop       - Stop schedule
///   POST   /tasks/{key}/restart    - Restart schedule
///   POST   /tasks/{key}/try-once   - Run once
///   GET    /tasks/{key}/running    - Running flag
///
/// /health  - Scheduler and pool summary
/// /livez   - Liveness check
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let task_routes = Router::new()
        .route("/", get(handlers::list_tasks))
        .route(
            "/{key}",
            get(handlers::get_task).put(handlers::update_task),
        )
        .route("/{key}/start", post(handlers::start_task))
        .route("/{key}/stop", post(handlers::stop_task))
        .route("/{key}/restart", post(handlers::restart_task))
        .route("/{key}/try-once", post(handlers::try_once))
        .route("/{key}/running", get(handlers::task_running))
        .with_state(state.clone());

    let monitoring_routes = Router::new()
        .route("/health", get(monitoring::health_check))
        .with_state(state);

    // Liveness has no state dependency
    let liveness_route = Router::new().route("/livez", get(monitoring::liveness_check));

    Router::new()
        .nest("/tasks", task_routes)
        .merge(monitoring_routes)
        .merge(liveness_route)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
