//! Error types module
//!
//! All failures of an upload task are unified under [`AppError`]. Every variant is
//! terminal for the task it belongs to; the HTTP layer renders it through
//! [`ErrorMetadata`] so status codes and client messages stay in one place.

use std::time::Duration;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SCAN_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Upload stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Scan error: {0}")]
    ScanError(String),

    #[error("Scan timed out after {0} seconds")]
    ScanTimeout(u64),

    #[error("Upload pipeline timed out after {0:?}")]
    PipelineTimeout(Duration),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::MalformedUpload(_) => (
            400,
            "MALFORMED_UPLOAD",
            false,
            Some("Send a multipart/form-data request with one file field"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidFilename(_) => (
            400,
            "INVALID_FILENAME",
            false,
            Some("Use a plain file name without path components"),
            false,
            LogLevel::Debug,
        ),
        AppError::StreamInterrupted(_) => (
            400,
            "STREAM_INTERRUPTED",
            true,
            Some("Retry the upload"),
            false,
            LogLevel::Warn,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::WriteError(_) => (
            500,
            "WRITE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::ScanError(_) => (
            500,
            "SCAN_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::ScanTimeout(_) => (
            500,
            "SCAN_TIMEOUT",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Error,
        ),
        AppError::PipelineTimeout(_) => (
            500,
            "PIPELINE_TIMEOUT",
            true,
            Some("Retry with a smaller file or after a short delay"),
            false,
            LogLevel::Error,
        ),
        AppError::UpstreamUnavailable(_) => (
            502,
            "UPSTREAM_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Warn,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::MalformedUpload(_) => "MalformedUpload",
            AppError::InvalidFilename(_) => "InvalidFilename",
            AppError::StreamInterrupted(_) => "StreamInterrupted",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::WriteError(_) => "WriteError",
            AppError::ScanError(_) => "ScanError",
            AppError::ScanTimeout(_) => "ScanTimeout",
            AppError::PipelineTimeout(_) => "PipelineTimeout",
            AppError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::MalformedUpload(ref msg) => msg.clone(),
            AppError::InvalidFilename(ref msg) => msg.clone(),
            AppError::StreamInterrupted(_) => "Upload stream was interrupted".to_string(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::WriteError(_) => "Failed to store file".to_string(),
            AppError::ScanError(_) => "Virus scanning temporarily unavailable".to_string(),
            AppError::ScanTimeout(secs) => format!("Virus scan timed out after {}s", secs),
            AppError::PipelineTimeout(limit) => format!("Upload timed out after {:?}", limit),
            AppError::UpstreamUnavailable(_) => "Upload service unavailable".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_client_errors() {
        let err = AppError::InvalidFilename("path traversal".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_FILENAME");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "path traversal");
        assert_eq!(err.log_level(), LogLevel::Debug);

        let err = AppError::MalformedUpload("No file provided".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "MALFORMED_UPLOAD");
    }

    #[test]
    fn test_error_metadata_server_errors() {
        for err in [
            AppError::WriteError("disk full".to_string()),
            AppError::ScanError("connection refused".to_string()),
            AppError::ScanTimeout(60),
            AppError::PipelineTimeout(Duration::from_secs(300)),
        ] {
            assert_eq!(err.http_status_code(), 500, "{}", err.error_type());
            assert!(err.is_recoverable());
            assert_eq!(err.log_level(), LogLevel::Error);
        }
    }

    #[test]
    fn test_scan_error_hides_engine_details() {
        let err = AppError::ScanError("stream: Eicar-Signature FOUND / 127.0.0.1:3310".to_string());
        assert!(err.is_sensitive());
        assert!(!err.client_message().contains("3310"));
        assert!(err.detailed_message().contains("3310"));
    }

    #[test]
    fn test_payload_too_large_status() {
        let err = AppError::PayloadTooLarge("limit is 1 MB".to_string());
        assert_eq!(err.http_status_code(), 413);
        assert_eq!(err.suggested_action(), Some("Reduce file size"));
    }

    #[test]
    fn test_upstream_unavailable_is_bad_gateway() {
        let err = AppError::UpstreamUnavailable("connection refused".to_string());
        assert_eq!(err.http_status_code(), 502);
        assert_eq!(err.error_code(), "UPSTREAM_UNAVAILABLE");
        assert!(err.is_recoverable());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Upload service unavailable");
    }

    #[test]
    fn test_sub_second_pipeline_timeout_message() {
        let err = AppError::PipelineTimeout(Duration::from_millis(100));
        assert_eq!(err.client_message(), "Upload timed out after 100ms");
        assert_eq!(err.to_string(), "Upload pipeline timed out after 100ms");
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let source = anyhow::anyhow!("root cause").context("outer");
        let err = AppError::from(source);
        assert!(err.detailed_message().contains("Caused by"));
        assert_eq!(err.client_message(), "Internal server error");
    }
}
