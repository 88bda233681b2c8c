//! Pipeline coordinator: one inbound stream, two branches, one outcome.
//!
//! The upload stream is teed through [`ScanPassthrough`] into the persistence
//! branch. The coordinator then waits on both branch futures and a single
//! deadline with `select!`, records each result exactly once on the
//! [`UploadTask`], and reconciles when both have settled: a clean verdict
//! promotes the staged file, an infected one discards it. Any branch error or
//! the deadline ends the task immediately; the scan session is cancelled
//! first and the staged bytes are removed afterwards.

use avgate_core::{
    AppError, ErrorMetadata, LogLevel, StagedObject, UploadOutcome, UploadReport, UploadTask,
};
use avgate_services::VirusScanner;
use avgate_storage::{ByteStream, StagingGuard, Storage};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

use super::persist_stage::persist_stream;
use super::scan_stage::ScanPassthrough;
use super::types::{IncomingFile, PipelineSettings};

#[derive(Clone)]
pub struct UploadPipeline {
    storage: Arc<dyn Storage>,
    scanner: Arc<dyn VirusScanner>,
    settings: PipelineSettings,
}

impl UploadPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        scanner: Arc<dyn VirusScanner>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            storage,
            scanner,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn scanner(&self) -> &Arc<dyn VirusScanner> {
        &self.scanner
    }

    /// Run one upload task to its terminal outcome.
    ///
    /// Never fails: errors are part of the report. Dropping the returned
    /// future cancels the scan session and removes any staged bytes.
    pub async fn run(&self, file: IncomingFile<'_>) -> UploadReport {
        let IncomingFile {
            filename,
            media_type,
            stream,
        } = file;

        let mut task = UploadTask::new(filename, media_type);
        let span = tracing::info_span!("upload", task_id = %task.id, filename = %task.filename);

        let outcome = match self.execute(&mut task, stream).instrument(span).await {
            Ok(outcome) => outcome,
            Err(err) => UploadOutcome::Failed(err),
        };

        let report = task.finish(outcome);
        log_report(&report);
        report
    }

    async fn execute(
        &self,
        task: &mut UploadTask,
        stream: ByteStream<'_>,
    ) -> Result<UploadOutcome, AppError> {
        let limit = self.settings.timeout;
        let deadline = Instant::now() + self.settings.timeout;

        if task.filename.trim().is_empty() {
            return Err(AppError::MalformedUpload(
                "No filename provided".to_string(),
            ));
        }
        self.storage.resolve(&task.filename)?;

        let mut session = tokio::time::timeout_at(deadline, self.scanner.open_session())
            .await
            .map_err(|_| AppError::PipelineTimeout(limit))??;
        let feeder = session
            .take_feeder()
            .ok_or_else(|| AppError::Internal("Scan session has no feed".to_string()))?;
        let cancel = session.cancel_token();

        let key = task.filename.clone();
        let task_id = task.id;
        let mut staging: Option<StagingGuard> = None;

        let failure = {
            let passthrough = ScanPassthrough::new(stream, feeder);
            let persist = persist_stream(
                self.storage.as_ref(),
                task_id,
                &key,
                Box::pin(passthrough),
                self.settings.max_upload_bytes,
            );
            let verdict = session.verdict();
            let expired = tokio::time::sleep_until(deadline);
            tokio::pin!(persist, verdict, expired);

            let failure = loop {
                if task.is_settled() {
                    break None;
                }

                tokio::select! {
                    res = &mut persist, if !task.persisted() => match res {
                        Ok(staged) => {
                            staging = Some(StagingGuard::new(staged.staging_path.clone()));
                            if let Err(e) = task.record_persisted(staged) {
                                break Some(e);
                            }
                        }
                        Err(e) => break Some(e),
                    },
                    res = &mut verdict, if task.verdict().is_none() => match res {
                        Ok(verdict) => {
                            tracing::debug!(
                                infected = verdict.is_infected(),
                                detail = %verdict.detail(),
                                "Scan branch completed"
                            );
                            if let Err(e) = task.record_verdict(verdict) {
                                break Some(e);
                            }
                        }
                        Err(e) => break Some(AppError::from(e)),
                    },
                    _ = &mut expired => break Some(AppError::PipelineTimeout(limit)),
                }
            };

            // Cancel while the persistence future is still alive; it is
            // dropped (and its partial file removed) when this block ends.
            if failure.is_some() {
                cancel.cancel();
            }
            failure
        };

        if let Some(err) = failure {
            if let Some(staged) = task.staged() {
                self.discard_staged(staged, &mut staging).await;
            }
            return Err(err);
        }

        let (Some(staged), Some(verdict)) = (task.staged().cloned(), task.verdict().cloned())
        else {
            return Err(AppError::Internal(
                "Upload task settled without both results".to_string(),
            ));
        };

        if verdict.is_infected() {
            self.discard_staged(&staged, &mut staging).await;
            return Ok(UploadOutcome::Rejected { verdict });
        }

        let stored = self.storage.promote(&staged).await?;
        if let Some(guard) = staging.as_mut() {
            guard.disarm();
        }

        Ok(UploadOutcome::Accepted { stored, verdict })
    }

    /// Best-effort removal of a staged artifact. Failures are logged and left
    /// to the guard.
    async fn discard_staged(&self, staged: &StagedObject, staging: &mut Option<StagingGuard>) {
        match self.storage.discard(staged).await {
            Ok(()) => {
                if let Some(guard) = staging.as_mut() {
                    guard.disarm();
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %staged.staging_path.display(),
                    error = %e,
                    "Failed to discard staged upload"
                );
            }
        }
    }
}

fn log_report(report: &UploadReport) {
    match &report.outcome {
        UploadOutcome::Accepted { stored, .. } => tracing::info!(
            task_id = %report.task_id,
            filename = %report.filename,
            size_bytes = stored.size_bytes,
            started_at = %report.started_at,
            finished_at = %report.finished_at,
            duration_ms = report.elapsed_ms,
            "Upload accepted"
        ),
        UploadOutcome::Rejected { verdict } => tracing::warn!(
            task_id = %report.task_id,
            filename = %report.filename,
            virus = verdict.signature().unwrap_or("unknown"),
            started_at = %report.started_at,
            finished_at = %report.finished_at,
            duration_ms = report.elapsed_ms,
            "Upload rejected: file is infected"
        ),
        UploadOutcome::Failed(err) => {
            let code = err.error_code();
            match err.log_level() {
                LogLevel::Debug => tracing::debug!(
                    task_id = %report.task_id,
                    filename = %report.filename,
                    code,
                    error = %err,
                    bytes_received = report.bytes_received,
                    started_at = %report.started_at,
                    finished_at = %report.finished_at,
                    duration_ms = report.elapsed_ms,
                    "Upload failed"
                ),
                LogLevel::Warn => tracing::warn!(
                    task_id = %report.task_id,
                    filename = %report.filename,
                    code,
                    error = %err,
                    bytes_received = report.bytes_received,
                    started_at = %report.started_at,
                    finished_at = %report.finished_at,
                    duration_ms = report.elapsed_ms,
                    "Upload failed"
                ),
                LogLevel::Error => tracing::error!(
                    task_id = %report.task_id,
                    filename = %report.filename,
                    code,
                    error = %err.detailed_message(),
                    bytes_received = report.bytes_received,
                    started_at = %report.started_at,
                    finished_at = %report.finished_at,
                    duration_ms = report.elapsed_ms,
                    "Upload failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use avgate_core::UploadResponse;
    use avgate_storage::LocalStorage;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    async fn local_storage() -> (TempDir, Arc<LocalStorage>) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        (dir, storage)
    }

    fn pipeline(
        storage: Arc<dyn Storage>,
        scanner: Arc<dyn VirusScanner>,
        timeout: Duration,
    ) -> UploadPipeline {
        UploadPipeline::new(
            storage,
            scanner,
            PipelineSettings {
                timeout,
                max_upload_bytes: None,
            },
        )
    }

    fn staging_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root.join(".incoming")).unwrap().next().is_none()
    }

    fn published(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n != ".incoming")
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn clean_upload_is_accepted() {
        let (dir, storage) = local_storage().await;
        let scanner = Arc::new(SignatureScanner::eicar());
        let pipeline = pipeline(storage.clone(), scanner.clone(), Duration::from_secs(30));

        let payload = patterned_payload(10 * 1024 * 1024);
        let report = pipeline
            .run(IncomingFile::new(
                "big.bin",
                "application/octet-stream",
                bytes_stream(payload.clone(), 64 * 1024),
            ))
            .await;

        match &report.outcome {
            UploadOutcome::Accepted { stored, verdict } => {
                assert_eq!(stored.size_bytes, payload.len() as u64);
                assert!(!verdict.is_infected());
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
        assert_eq!(storage.read("big.bin").await.unwrap(), payload);
        assert_eq!(scanner.bytes_scanned(), payload.len() as u64);
        assert!(staging_is_empty(dir.path()));
        assert_eq!(report.outcome.http_status_code(), 200);
    }

    #[tokio::test]
    async fn eicar_upload_is_rejected_and_not_addressable() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(SignatureScanner::eicar()),
            Duration::from_secs(30),
        );

        // Split so the signature straddles chunk boundaries.
        let report = pipeline
            .run(IncomingFile::new(
                "eicar.com",
                "application/octet-stream",
                bytes_stream(EICAR.to_vec(), 7),
            ))
            .await;

        match &report.outcome {
            UploadOutcome::Rejected { verdict } => {
                assert_eq!(verdict.signature(), Some(EICAR_SIGNATURE));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
        assert!(!storage.exists("eicar.com").await.unwrap());
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
        assert_eq!(report.outcome.http_status_code(), 400);
    }

    #[tokio::test]
    async fn infected_verdict_before_persistence_still_discards() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(SignatureScanner::eicar()),
            Duration::from_secs(30),
        );

        let mut payload = EICAR.to_vec();
        payload.extend(patterned_payload(64 * 1024));
        let report = pipeline
            .run(IncomingFile::new(
                "late.bin",
                "application/octet-stream",
                slow_stream(payload, 8 * 1024, Duration::from_millis(5)),
            ))
            .await;

        assert!(report.outcome.is_rejected());
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn outcome_waits_for_late_verdict() {
        let (dir, storage) = local_storage().await;
        let scanner = SignatureScanner::eicar().with_verdict_delay(Duration::from_millis(300));
        let pipeline = pipeline(storage.clone(), Arc::new(scanner), Duration::from_secs(30));

        let report = pipeline
            .run(IncomingFile::new(
                "slow-verdict.txt",
                "text/plain",
                bytes_stream(b"hello".to_vec(), 2),
            ))
            .await;

        assert!(report.outcome.is_accepted());
        assert!(report.elapsed_ms >= 300);
        assert_eq!(published(dir.path()), vec!["slow-verdict.txt".to_string()]);
    }

    #[tokio::test]
    async fn identical_uploads_are_idempotent() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(SignatureScanner::eicar()),
            Duration::from_secs(30),
        );
        let payload = patterned_payload(100_000);

        for _ in 0..2 {
            let report = pipeline
                .run(IncomingFile::new(
                    "same.dat",
                    "application/octet-stream",
                    bytes_stream(payload.clone(), 4096),
                ))
                .await;
            assert!(report.outcome.is_accepted());
        }

        assert_eq!(storage.read("same.dat").await.unwrap(), payload);
        assert_eq!(published(dir.path()), vec!["same.dat".to_string()]);
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn zero_byte_upload_completes() {
        let (_dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(SignatureScanner::eicar()),
            Duration::from_secs(30),
        );

        let report = pipeline
            .run(IncomingFile::new("empty.txt", "text/plain", bytes_stream(Vec::new(), 16)))
            .await;

        match &report.outcome {
            UploadOutcome::Accepted { stored, .. } => assert_eq!(stored.size_bytes, 0),
            other => panic!("expected Accepted, got {:?}", other),
        }
        assert!(storage.read("empty.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_filenames_rejected_without_writes() {
        let (dir, storage) = local_storage().await;
        let scanner = Arc::new(SignatureScanner::eicar());
        let pipeline = pipeline(storage.clone(), scanner.clone(), Duration::from_secs(30));

        for name in ["../../etc/passwd", "/etc/passwd", "a/b.txt", ".hidden"] {
            let report = pipeline
                .run(IncomingFile::new(name, "text/plain", bytes_stream(b"x".to_vec(), 1)))
                .await;
            assert!(
                matches!(report.outcome, UploadOutcome::Failed(AppError::InvalidFilename(_))),
                "{name}: {:?}",
                report.outcome
            );
            assert_eq!(report.outcome.http_status_code(), 400);
        }

        let report = pipeline
            .run(IncomingFile::new("", "text/plain", bytes_stream(b"x".to_vec(), 1)))
            .await;
        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::MalformedUpload(_))
        ));

        assert_eq!(scanner.sessions_opened(), 0);
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn unreachable_scanner_fails_task() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(UnreachableScanner),
            Duration::from_secs(30),
        );

        let report = pipeline
            .run(IncomingFile::new(
                "report.pdf",
                "application/pdf",
                bytes_stream(b"%PDF-1.7".to_vec(), 4),
            ))
            .await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::ScanError(_))
        ));
        assert_eq!(report.outcome.http_status_code(), 500);
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn scanner_failure_mid_stream_fails_task() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(FailingScanner),
            Duration::from_secs(30),
        );

        let report = pipeline
            .run(IncomingFile::new(
                "data.bin",
                "application/octet-stream",
                bytes_stream(patterned_payload(256 * 1024), 1024),
            ))
            .await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::ScanError(_))
        ));
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn write_failure_cancels_scan() {
        let (dir, local) = local_storage().await;
        let storage = Arc::new(FailingStorage::new(local.as_ref().clone(), 1024));
        let scanner = Arc::new(SignatureScanner::eicar());
        let pipeline = pipeline(storage, scanner.clone(), Duration::from_secs(30));

        let report = pipeline
            .run(IncomingFile::new(
                "disk-full.bin",
                "application/octet-stream",
                bytes_stream(patterned_payload(64 * 1024), 512),
            ))
            .await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::WriteError(_))
        ));
        assert_eq!(report.outcome.http_status_code(), 500);
        assert!(scanner.all_sessions_cancelled());
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn pipeline_timeout_cancels_and_cleans_up() {
        let (dir, storage) = local_storage().await;
        let scanner = Arc::new(SignatureScanner::stalled());
        let pipeline = pipeline(storage.clone(), scanner.clone(), Duration::from_millis(300));

        let report = pipeline
            .run(IncomingFile::new(
                "stuck.txt",
                "text/plain",
                bytes_stream(b"never judged".to_vec(), 4),
            ))
            .await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::PipelineTimeout(limit))
                if limit == Duration::from_millis(300)
        ));
        let body = UploadResponse::from(&report);
        assert_eq!(body.message, "Upload timed out after 300ms");
        assert!(scanner.all_sessions_cancelled());
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn session_open_timeout_reports_sub_second_deadline() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(storage, Arc::new(HangingScanner), Duration::from_millis(100));

        let report = pipeline
            .run(IncomingFile::new(
                "waiting.txt",
                "text/plain",
                bytes_stream(b"queued".to_vec(), 2),
            ))
            .await;

        match &report.outcome {
            UploadOutcome::Failed(err @ AppError::PipelineTimeout(_)) => {
                assert_eq!(err.client_message(), "Upload timed out after 100ms");
            }
            other => panic!("expected PipelineTimeout, got {:?}", other),
        }
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn interrupted_stream_is_client_error() {
        let (dir, storage) = local_storage().await;
        let pipeline = pipeline(
            storage.clone(),
            Arc::new(SignatureScanner::eicar()),
            Duration::from_secs(30),
        );

        let report = pipeline
            .run(IncomingFile::new(
                "cut.bin",
                "application/octet-stream",
                interrupted_stream(b"first half".to_vec()),
            ))
            .await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::StreamInterrupted(_))
        ));
        assert_eq!(report.outcome.http_status_code(), 400);
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn size_limit_fails_with_payload_too_large() {
        let (dir, storage) = local_storage().await;
        let pipeline = UploadPipeline::new(
            storage.clone(),
            Arc::new(SignatureScanner::eicar()),
            PipelineSettings {
                timeout: Duration::from_secs(30),
                max_upload_bytes: Some(1000),
            },
        );

        let report = pipeline
            .run(IncomingFile::new(
                "big.bin",
                "application/octet-stream",
                bytes_stream(patterned_payload(4000), 100),
            ))
            .await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::Failed(AppError::PayloadTooLarge(_))
        ));
        assert_eq!(report.outcome.http_status_code(), 413);
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn dropping_run_cleans_up() {
        let (dir, storage) = local_storage().await;
        let scanner = Arc::new(SignatureScanner::stalled());
        let pipeline = pipeline(storage.clone(), scanner.clone(), Duration::from_secs(30));

        // Simulates the client disconnecting while the verdict is pending.
        let run = pipeline.run(IncomingFile::new(
            "gone.txt",
            "text/plain",
            bytes_stream(b"abandoned".to_vec(), 3),
        ));
        let result = tokio::time::timeout(Duration::from_millis(200), run).await;
        assert!(result.is_err());

        assert!(scanner.all_sessions_cancelled());
        assert!(published(dir.path()).is_empty());
        assert!(staging_is_empty(dir.path()));
    }
}
