use crate::error::{BoxError, originates_from_reporting};
use crate::exception::ExceptionFilter;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// A default exception filter for failures re-raised by the capture layer
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpExceptionFilter;

impl ExceptionFilter for HttpExceptionFilter {
    fn catch(&self, error: BoxError) -> Response {
        if originates_from_reporting(error.as_ref()) {
            tracing::warn!(error = %error, "request failed in the error delivery path");
        } else {
            tracing::error!(error = %error, "request failed");
        }

        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }
}

/// JSON error body shared by every failure response.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "statusCode": status.as_u16(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}
