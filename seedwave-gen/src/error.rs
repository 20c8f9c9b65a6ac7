//! HTTP error responses
//!
//! Every error body is `{"error": {"code": ..., "message": ...}}`. Codes
//! reuse the pipeline's wire vocabulary where one applies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::services::RunError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    /// Malformed request body or seed input
    #[error("{0}")]
    BadRequest(String),

    /// The run's lifecycle does not allow the request (cancel after finish, double start)
    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] seedwave_common::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunError::AlreadyRunning(_)
            | RunError::NotPending(..)
            | RunError::AlreadyTerminal(..) => ApiError::Conflict(err.to_string()),
            RunError::InvalidInput(msg) => ApiError::BadRequest(msg),
            RunError::Storage(e) => ApiError::Storage(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PipelineStatus;
    use http_body_util::BodyExt;
    use uuid::Uuid;

    #[test]
    fn test_run_errors_map_to_http_status() {
        let id = Uuid::new_v4();
        let cases = [
            (RunError::NotFound(id), StatusCode::NOT_FOUND),
            (RunError::AlreadyRunning(id), StatusCode::CONFLICT),
            (
                RunError::AlreadyTerminal(id, PipelineStatus::Complete),
                StatusCode::CONFLICT,
            ),
            (
                RunError::InvalidInput("query must not be empty".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RunError::Storage(seedwave_common::Error::Internal("disk full".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::BadRequest("playlistSize must be 15, 30 or 50".to_string())
            .into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["message"], "playlistSize must be 15, 30 or 50");
    }
}
