//! API error types and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use taskhands_core::SchedulerError;
use thiserror::Error;
use tracing::{debug, error};

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Error from the scheduling engine or registry.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Malformed request body.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Scheduler(err) => match err {
                SchedulerError::UnknownTask(_) => StatusCode::NOT_FOUND,
                SchedulerError::InvalidSchedule { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SchedulerError::InvalidDescriptor(_) => StatusCode::BAD_REQUEST,
                SchedulerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                SchedulerError::Store(_) | SchedulerError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Scheduler(err) => err.code(),
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {}", self);
        } else {
            debug!(code = self.code(), "Request rejected: {}", self);
        }

        (
            status,
            Json(json!({"error": self.to_string(), "code": self.code()})),
        )
            .into_response()
    }
}
