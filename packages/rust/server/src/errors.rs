use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tiki_shared::TikiError;
use tracing::error;

/// Error type returned by request handlers.
///
/// Every variant renders as a JSON body of the form `{"error": "..."}`.
#[derive(Debug)]
pub enum AppError {
    /// Rejected request input (400).
    BadRequest(String),
    /// Unknown job or missing stage output (404).
    NotFound,
    /// Anything else (500).
    Internal(TikiError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<TikiError> for AppError {
    fn from(err: TikiError) -> Self {
        match err {
            TikiError::Validation { message } => AppError::BadRequest(message),
            TikiError::NotFound(_) => AppError::NotFound,
            other => AppError::Internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Internal(err) => {
                // Log the original error for debugging purposes
                error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
