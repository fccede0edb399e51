use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;

/// Renders any escaped error as `{"error":{"message":...}}` with status 500.
#[derive(Debug)]
pub struct ApiError(pub unillm_core::Error);

impl From<unillm_core::Error> for ApiError {
    fn from(e: unillm_core::Error) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorEnvelope::new(self.0.to_string())),
        )
            .into_response()
    }
}
