use std::sync::Arc;
use std::time::Instant;

use avgate_core::{UploadOutcome, UploadResponse};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{with_error_details, HttpAppError};
use crate::state::AppState;
use crate::utils::upload::stream_first_file;

/// Upload handler
///
/// Streams the first file field of a multipart form through the scan and
/// store pipeline and answers once the upload has a terminal outcome.
///
/// # Returns
/// `UploadResponse` with the file info, scan summary and elapsed time:
/// - 200 when the file was clean and stored
/// - 400 when the scanner found a signature, or the file name or stream was bad
/// - 413 when the file exceeds `MAX_UPLOAD_SIZE_MB`
/// - 500 when scanning, storage or the pipeline deadline failed
///
/// # Errors
/// - `AppError::MalformedUpload` - Not multipart, or no file field. Rendered in
///   the same envelope with an empty `fileInfo`.
#[tracing::instrument(skip(state, multipart), fields(operation = "upload_file"))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, HttpAppError> {
    let started = Instant::now();
    let mut multipart = multipart.map_err(|r| HttpAppError::from_rejection(r, started))?;

    let upload = stream_first_file(&mut multipart, &state.pipeline)
        .await
        .map_err(|e| HttpAppError::new(e, started))?;

    let status = StatusCode::from_u16(upload.report.outcome.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut body = UploadResponse::from(&upload.report);
    if let UploadOutcome::Failed(err) = &upload.report.outcome {
        body = with_error_details(body, err);
    }
    body.discarded = upload.discarded;

    Ok((status, Json(body)).into_response())
}
