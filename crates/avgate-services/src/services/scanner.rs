//! Scanning channel abstraction
//!
//! A scanner opens one [`ScanSession`] per upload. The session owns the feed
//! half of a bounded queue and a handle to the task that talks to the engine;
//! it yields exactly one verdict.

use async_trait::async_trait;
use avgate_core::{AppError, ScanVerdict};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Scanning channel errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scanner unavailable at {address}: {reason}")]
    Unavailable { address: String, reason: String },

    #[error("Scan failed: {0}")]
    Failed(String),

    #[error("Malformed scanner reply: {0}")]
    MalformedReply(String),

    #[error("Scan timed out after {0} seconds")]
    Timeout(u64),

    #[error("Scan cancelled")]
    Cancelled,
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Timeout(secs) => AppError::ScanTimeout(secs),
            other => AppError::ScanError(other.to_string()),
        }
    }
}

/// Factory for scanning sessions, shared process-wide.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    /// Open a session for one upload.
    ///
    /// Connectivity problems surface here, before any upload bytes are
    /// consumed, so they can still be retried.
    async fn open_session(&self) -> Result<ScanSession, ScanError>;

    /// Lightweight liveness check for health checks.
    async fn ping(&self) -> Result<(), ScanError>;
}

/// One scanning conversation.
///
/// Dropping an unfinished session cancels it.
#[derive(Debug)]
pub struct ScanSession {
    feeder: Option<mpsc::Sender<Bytes>>,
    verdict: JoinHandle<Result<ScanVerdict, ScanError>>,
    cancel: CancellationToken,
    finished: bool,
}

impl ScanSession {
    /// Assemble a session from its feed queue, the task producing the
    /// verdict, and the token that task watches for cancellation.
    pub fn new(
        feeder: mpsc::Sender<Bytes>,
        verdict: JoinHandle<Result<ScanVerdict, ScanError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feeder: Some(feeder),
            verdict,
            cancel,
            finished: false,
        }
    }

    /// Take the feed half. Dropping every clone of it marks end of input.
    pub fn take_feeder(&mut self) -> Option<mpsc::Sender<Bytes>> {
        self.feeder.take()
    }

    /// Token that cancels this session when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the verdict. Resolves once; later calls fail.
    pub async fn verdict(&mut self) -> Result<ScanVerdict, ScanError> {
        if self.finished {
            return Err(ScanError::Failed("verdict already consumed".to_string()));
        }

        let result = (&mut self.verdict).await;
        self.finished = true;

        match result {
            Ok(verdict) => verdict,
            Err(e) if e.is_cancelled() => Err(ScanError::Cancelled),
            Err(e) => Err(ScanError::Failed(format!("scan task failed: {}", e))),
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
            self.verdict.abort();
        }
    }
}

/// Extract the signature name from a clamd `FOUND` reply.
///
/// Replies look like `stream: Eicar-Test-Signature FOUND`.
pub fn parse_signature(reply: &str) -> Option<String> {
    let reply = reply.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    let body = reply.strip_suffix("FOUND")?;
    let name = body.split(':').nth(1)?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
