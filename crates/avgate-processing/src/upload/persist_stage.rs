//! Persistence branch: stream the upload into a staging artifact.

use avgate_core::{AppError, ErrorMetadata, StagedObject};
use avgate_storage::{ByteStream, Storage};
use std::time::Instant;
use uuid::Uuid;

/// Write `source` into staging for `key`.
///
/// Completes once the staging file is flushed and closed. Inbound read
/// failures come back as `StreamInterrupted`, sink failures as `WriteError`;
/// either way no partial artifact is left behind.
pub async fn persist_stream(
    storage: &dyn Storage,
    task_id: Uuid,
    key: &str,
    source: ByteStream<'_>,
    max_bytes: Option<u64>,
) -> Result<StagedObject, AppError> {
    let start = Instant::now();

    match storage.stage_stream(task_id, key, source, max_bytes).await {
        Ok(staged) => {
            tracing::debug!(
                task_id = %task_id,
                size_bytes = staged.size_bytes,
                duration_ms = start.elapsed().as_millis() as u64,
                "Persistence branch completed"
            );
            Ok(staged)
        }
        Err(e) => {
            let err = AppError::from(e);
            tracing::debug!(
                task_id = %task_id,
                error = %err,
                code = err.error_code(),
                "Persistence branch failed"
            );
            Err(err)
        }
    }
}
