//! HTTP error response conversion
//!
//! Every failure is rendered in the upload response envelope
//! (`message`, `fileInfo`, `time`, plus `code` and `recoverable`), whether the
//! pipeline produced it or the request never reached the pipeline.
//!
//! **Preferred handler pattern:** Return `Result<impl IntoResponse, HttpAppError>` and
//! build the error with [`HttpAppError::new`] so the elapsed time is reported.

use avgate_core::{AppError, ErrorMetadata, LogLevel, UploadResponse};
use axum::{
    extract::multipart::MultipartRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from avgate-core)
#[derive(Debug)]
pub struct HttpAppError {
    pub error: AppError,
    /// Milliseconds spent on the request before it failed
    pub elapsed_ms: u64,
}

impl HttpAppError {
    pub fn new(error: AppError, started: Instant) -> Self {
        Self {
            error,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Requests that are not multipart at all, or lack a boundary.
    pub fn from_rejection(rejection: MultipartRejection, started: Instant) -> Self {
        Self::new(
            AppError::MalformedUpload(format!(
                "Expected a multipart/form-data body: {}",
                rejection.body_text()
            )),
            started,
        )
    }
}

pub(crate) fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

pub(crate) fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

/// Attach the error chain to a failure body.
///
/// Sensitive errors (scanner and storage internals) never carry details, and
/// production hides details for everything.
pub fn with_error_details(body: UploadResponse, error: &AppError) -> UploadResponse {
    if is_production_env() || error.is_sensitive() {
        body
    } else {
        body.with_details(error.error_type(), error.detailed_message())
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.error;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let body = with_error_details(
            UploadResponse::request_failed(app_error, self.elapsed_ms),
            app_error,
        );
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[test]
    fn test_sensitive_errors_hide_details() {
        let err = AppError::ScanError("127.0.0.1:3310: Connection refused".to_string());
        let body = with_error_details(UploadResponse::request_failed(&err, 0), &err);
        let body = serde_json::to_value(body).expect("serialize");
        assert_eq!(body["code"], "SCAN_ERROR");
        assert_eq!(body["recoverable"], true);
        assert!(body.get("details").is_none());
        assert!(!body.to_string().contains("3310"));
    }

    #[tokio::test]
    async fn test_into_response_uses_upload_envelope() {
        let error = HttpAppError {
            error: AppError::MalformedUpload("No file provided".into()),
            elapsed_ms: 3,
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["message"], "No file provided");
        assert_eq!(body["code"], "MALFORMED_UPLOAD");
        assert_eq!(body["time"], 3);
        assert_eq!(body["fileInfo"]["saved"], false);
    }

    #[test]
    fn test_into_response_status() {
        let response = HttpAppError::new(
            AppError::PayloadTooLarge("limit".into()),
            Instant::now(),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
