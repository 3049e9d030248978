//! API error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use sundial_scheduler::SchedulerError;

/// Error envelope returned by every failing route.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::DuplicateJob(_) => {
                Self::new(StatusCode::CONFLICT, "duplicate_job", err.to_string())
            }
            SchedulerError::JobNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "job_not_found", err.to_string())
            }
            SchedulerError::InvalidPostId(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                err.to_string(),
            ),
            SchedulerError::Io(_) | SchedulerError::Json(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                err.to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.code,
                "message": self.message,
            })),
        )
            .into_response()
    }
}
