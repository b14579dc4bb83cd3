// Crate-level error type for the HTTP surface and binary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::queue::QueueError;
use crate::storage::UploadError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("No dataset uploaded yet")]
    NoDataset,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Chat session is no longer running")]
    Unavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NoDataset => AppError::NoDataset,
            QueueError::EmptyQuestion => AppError::InvalidRequest(err.to_string()),
            QueueError::Closed => AppError::Unavailable,
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upload(UploadError::InvalidFile(_)) => StatusCode::BAD_REQUEST,
            AppError::Upload(UploadError::SessionChanged) => StatusCode::CONFLICT,
            AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::NoDataset => StatusCode::CONFLICT,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Upload errors already carry their user-facing wording
        let message = match &self {
            AppError::Upload(err) => err.to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
