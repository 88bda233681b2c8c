//! Common utilities for the upload handler

use avgate_core::{AppError, UploadReport};
use avgate_processing::{IncomingFile, UploadPipeline};
use avgate_storage::ByteStream;
use axum::extract::multipart::{Field, Multipart};
use futures::TryStreamExt;
use std::io;

/// Used when the client does not declare a part content type.
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Result of reading one multipart request.
#[derive(Debug)]
pub struct MultipartUpload {
    pub report: UploadReport,
    /// File names of further file fields, drained without being stored
    pub discarded: Vec<String>,
}

/// Stream the first file field of `multipart` through the pipeline.
///
/// Text fields are skipped. The file bytes go straight from the request body
/// into the pipeline; nothing is buffered here. Further file fields are read
/// to the end and dropped so the client is not left mid-request.
///
/// # Errors
/// `MalformedUpload` if the body cannot be parsed before a file field is
/// found, or if there is no file field at all. Once the first file has been
/// handled its report is final; later parse errors are only logged.
pub async fn stream_first_file(
    multipart: &mut Multipart,
    pipeline: &UploadPipeline,
) -> Result<MultipartUpload, AppError> {
    let mut report: Option<UploadReport> = None;
    let mut discarded = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if report.is_some() => {
                tracing::warn!(error = %e.body_text(), "Stopped reading multipart after the first file");
                break;
            }
            Err(e) => {
                return Err(AppError::MalformedUpload(format!(
                    "Failed to read multipart: {}",
                    e.body_text()
                )))
            }
        };

        let Some(filename) = field.file_name().map(str::to_owned) else {
            tracing::trace!(field = ?field.name(), "Skipping non-file field");
            continue;
        };

        if report.is_some() {
            let drained = drain_field(field).await;
            tracing::warn!(
                filename = %filename,
                drained_bytes = drained,
                "Ignoring extra file field; only the first file is processed"
            );
            discarded.push(filename);
            continue;
        }

        let media_type = field
            .content_type()
            .map(str::to_owned)
            .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());

        let stream: ByteStream<'_> = Box::pin(
            field.map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e.body_text())),
        );

        report = Some(
            pipeline
                .run(IncomingFile::new(filename, media_type, stream))
                .await,
        );
    }

    match report {
        Some(report) => Ok(MultipartUpload { report, discarded }),
        None => Err(AppError::MalformedUpload("No file provided".to_string())),
    }
}

/// Read a field to its end, returning how many bytes it carried.
async fn drain_field(mut field: Field<'_>) -> u64 {
    let mut drained = 0u64;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len() as u64,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e.body_text(), "Failed to drain extra file field");
                break;
            }
        }
    }
    drained
}
