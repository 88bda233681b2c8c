use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::constants::{MESSAGE_INFECTED, MESSAGE_OK, MESSAGE_REJECTED};
use crate::error::{AppError, ErrorMetadata};
use crate::storage_types::{StagedObject, StoredObject};

/// Verdict of the scanning branch.
///
/// `detail` is the engine's raw reply. It is kept for logs and never rendered
/// to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean {
        detail: String,
    },
    Infected {
        signature: Option<String>,
        detail: String,
    },
}

impl ScanVerdict {
    pub fn is_infected(&self) -> bool {
        matches!(self, ScanVerdict::Infected { .. })
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            ScanVerdict::Infected { signature, .. } => signature.as_deref(),
            ScanVerdict::Clean { .. } => None,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ScanVerdict::Clean { detail } | ScanVerdict::Infected { detail, .. } => detail,
        }
    }
}

/// One in-flight file transfer.
///
/// The persistence and scan results are single-assignment: each may be
/// recorded once, and the task is settled only when both are.
#[derive(Debug)]
pub struct UploadTask {
    pub id: Uuid,
    pub filename: String,
    pub declared_media_type: String,
    pub started_at: DateTime<Utc>,
    pub bytes_received: u64,
    started: Instant,
    persisted: Option<StagedObject>,
    scan_verdict: Option<ScanVerdict>,
}

impl UploadTask {
    pub fn new(filename: impl Into<String>, declared_media_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            declared_media_type: declared_media_type.into(),
            started_at: Utc::now(),
            bytes_received: 0,
            started: Instant::now(),
            persisted: None,
            scan_verdict: None,
        }
    }

    /// Record completion of the persistence branch.
    pub fn record_persisted(&mut self, staged: StagedObject) -> Result<(), AppError> {
        if self.persisted.is_some() {
            return Err(AppError::Internal(format!(
                "persistence recorded twice for upload {}",
                self.id
            )));
        }
        self.bytes_received = staged.size_bytes;
        self.persisted = Some(staged);
        Ok(())
    }

    /// Record the verdict of the scanning branch.
    pub fn record_verdict(&mut self, verdict: ScanVerdict) -> Result<(), AppError> {
        if self.scan_verdict.is_some() {
            return Err(AppError::Internal(format!(
                "scan verdict recorded twice for upload {}",
                self.id
            )));
        }
        self.scan_verdict = Some(verdict);
        Ok(())
    }

    pub fn persisted(&self) -> bool {
        self.persisted.is_some()
    }

    /// Staged artifact; only present once persistence has completed.
    pub fn staged(&self) -> Option<&StagedObject> {
        self.persisted.as_ref()
    }

    pub fn verdict(&self) -> Option<&ScanVerdict> {
        self.scan_verdict.as_ref()
    }

    /// Both branches have reported.
    pub fn is_settled(&self) -> bool {
        self.persisted.is_some() && self.scan_verdict.is_some()
    }

    /// Stamp the finish time and consume the task into its report.
    pub fn finish(self, outcome: UploadOutcome) -> UploadReport {
        UploadReport {
            task_id: self.id,
            filename: self.filename,
            media_type: self.declared_media_type,
            bytes_received: self.bytes_received,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            outcome,
        }
    }
}

/// Consolidated outcome of one upload.
#[derive(Debug)]
pub enum UploadOutcome {
    Accepted {
        stored: StoredObject,
        verdict: ScanVerdict,
    },
    Rejected {
        verdict: ScanVerdict,
    },
    Failed(AppError),
}

impl UploadOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UploadOutcome::Accepted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, UploadOutcome::Rejected { .. })
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            UploadOutcome::Accepted { .. } => 200,
            UploadOutcome::Rejected { .. } => 400,
            UploadOutcome::Failed(err) => err.http_status_code(),
        }
    }
}

/// Result of running one task through the pipeline.
#[derive(Debug)]
pub struct UploadReport {
    pub task_id: Uuid,
    pub filename: String,
    pub media_type: String,
    pub bytes_received: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: UploadOutcome,
}

/// Safe summary of a scan, as shown to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub is_infected: bool,
    pub viruses: Vec<String>,
}

impl From<&ScanVerdict> for ScanSummary {
    fn from(verdict: &ScanVerdict) -> Self {
        match verdict {
            ScanVerdict::Clean { .. } => ScanSummary {
                is_infected: false,
                viruses: Vec::new(),
            },
            ScanVerdict::Infected { signature, .. } => ScanSummary {
                is_infected: true,
                viruses: signature.iter().cloned().collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub mime_type: String,
    pub file_path: Option<String>,
    pub saved: bool,
    pub scan: Option<ScanSummary>,
}

/// Response body of the upload endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// "OK", "INFECTED", "REJECTED", or a client-safe error message
    pub message: String,
    pub file_info: FileInfo,
    /// Elapsed milliseconds from task start to outcome
    pub time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recoverable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Full error chain; only set outside production for non-sensitive errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// File fields that were present in the request but not processed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discarded: Vec<String>,
}

impl From<&UploadReport> for UploadResponse {
    fn from(report: &UploadReport) -> Self {
        let mut file_info = FileInfo {
            filename: report.filename.clone(),
            mime_type: report.media_type.clone(),
            file_path: None,
            saved: false,
            scan: None,
        };

        let message = match &report.outcome {
            UploadOutcome::Accepted { stored, verdict } => {
                file_info.file_path = Some(stored.key.clone());
                file_info.saved = true;
                file_info.scan = Some(verdict.into());
                MESSAGE_OK
            }
            UploadOutcome::Rejected { verdict } => {
                file_info.scan = Some(verdict.into());
                // An infected reply without a signature name is still a rejection.
                if verdict.signature().is_some() {
                    MESSAGE_INFECTED
                } else {
                    MESSAGE_REJECTED
                }
            }
            UploadOutcome::Failed(err) => {
                return UploadResponse::failed(err, file_info, report.elapsed_ms);
            }
        };

        UploadResponse {
            message: message.to_string(),
            file_info,
            time: report.elapsed_ms,
            code: None,
            recoverable: None,
            suggested_action: None,
            error_type: None,
            details: None,
            discarded: Vec::new(),
        }
    }
}

impl UploadResponse {
    /// Response for a request that failed before any file reached the
    /// pipeline: not multipart, no file field, or no upstream to forward to.
    pub fn request_failed(err: &AppError, elapsed_ms: u64) -> Self {
        let file_info = FileInfo {
            filename: String::new(),
            mime_type: String::new(),
            file_path: None,
            saved: false,
            scan: None,
        };
        Self::failed(err, file_info, elapsed_ms)
    }

    fn failed(err: &AppError, file_info: FileInfo, elapsed_ms: u64) -> Self {
        UploadResponse {
            message: err.client_message(),
            file_info,
            time: elapsed_ms,
            code: Some(err.error_code().to_string()),
            recoverable: Some(err.is_recoverable()),
            suggested_action: err.suggested_action().map(str::to_string),
            error_type: None,
            details: None,
            discarded: Vec::new(),
        }
    }

    pub fn with_details(mut self, error_type: impl Into<String>, details: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self.details = Some(details.into());
        self
    }
}
