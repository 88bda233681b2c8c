//! In-process scanner doubles.

use super::fixtures::{EICAR, EICAR_SIGNATURE};
use async_trait::async_trait;
use avgate_core::ScanVerdict;
use avgate_services::{ScanError, ScanSession, VirusScanner};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const QUEUE_DEPTH: usize = 8;

/// Matches one byte signature across chunk boundaries, with bounded memory.
///
/// Reports `Infected` as soon as the signature is seen and `Clean` at end of
/// input (after the configured delay). Every session's cancellation token is
/// kept so tests can assert cleanup.
#[derive(Clone)]
pub struct SignatureScanner {
    signature: Arc<Vec<u8>>,
    name: String,
    verdict_delay: Option<Duration>,
    opened: Arc<AtomicUsize>,
    scanned: Arc<AtomicU64>,
    tokens: Arc<Mutex<Vec<CancellationToken>>>,
}

impl SignatureScanner {
    pub fn new(signature: &[u8], name: impl Into<String>) -> Self {
        Self {
            signature: Arc::new(signature.to_vec()),
            name: name.into(),
            verdict_delay: None,
            opened: Arc::new(AtomicUsize::new(0)),
            scanned: Arc::new(AtomicU64::new(0)),
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Detects the EICAR test file, like clamd does.
    pub fn eicar() -> Self {
        Self::new(EICAR, EICAR_SIGNATURE)
    }

    /// Consumes input but never reaches a verdict.
    pub fn stalled() -> Self {
        Self::eicar().with_verdict_delay(Duration::from_secs(24 * 60 * 60))
    }

    /// Hold the clean verdict back after end of input.
    pub fn with_verdict_delay(mut self, delay: Duration) -> Self {
        self.verdict_delay = Some(delay);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn bytes_scanned(&self) -> u64 {
        self.scanned.load(Ordering::SeqCst)
    }

    /// At least one session was opened and every one was cancelled.
    pub fn all_sessions_cancelled(&self) -> bool {
        let tokens = self.tokens.lock().unwrap();
        !tokens.is_empty() && tokens.iter().all(|t| t.is_cancelled())
    }
}

#[async_trait]
impl VirusScanner for SignatureScanner {
    async fn open_session(&self) -> Result<ScanSession, ScanError> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (tx, mut rx) = mpsc::channel::<Bytes>(QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        self.tokens.lock().unwrap().push(cancel.clone());
        let watched = cancel.clone();

        let signature = self.signature.clone();
        let name = self.name.clone();
        let delay = self.verdict_delay;
        let scanned = self.scanned.clone();

        let handle = tokio::spawn(async move {
            let scan = async move {
                let keep = signature.len().saturating_sub(1);
                let mut window: Vec<u8> = Vec::with_capacity(keep * 2);

                while let Some(chunk) = rx.recv().await {
                    scanned.fetch_add(chunk.len() as u64, Ordering::SeqCst);
                    window.extend_from_slice(&chunk);
                    if !signature.is_empty()
                        && window.windows(signature.len()).any(|w| w == signature.as_slice())
                    {
                        return Ok(ScanVerdict::Infected {
                            signature: Some(name.clone()),
                            detail: format!("stream: {} FOUND", name),
                        });
                    }
                    let cut = window.len().saturating_sub(keep);
                    window.drain(..cut);
                }

                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, ScanError>(ScanVerdict::Clean {
                    detail: "stream: OK".to_string(),
                })
            };

            tokio::select! {
                _ = watched.cancelled() => Err(ScanError::Cancelled),
                res = scan => res,
            }
        });

        Ok(ScanSession::new(tx, handle, cancel))
    }

    async fn ping(&self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// A scanner whose daemon cannot be reached.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnreachableScanner;

#[async_trait]
impl VirusScanner for UnreachableScanner {
    async fn open_session(&self) -> Result<ScanSession, ScanError> {
        Err(ScanError::Unavailable {
            address: "127.0.0.1:3310".to_string(),
            reason: "Connection refused (os error 111)".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), ScanError> {
        self.open_session().await.map(|_| ())
    }
}

/// Connects, then drops the conversation after the first chunk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingScanner;

#[async_trait]
impl VirusScanner for FailingScanner {
    async fn open_session(&self) -> Result<ScanSession, ScanError> {
        let (tx, mut rx) = mpsc::channel::<Bytes>(QUEUE_DEPTH);
        let handle = tokio::spawn(async move {
            let _ = rx.recv().await;
            Err::<ScanVerdict, _>(ScanError::Failed(
                "Connection reset by peer (os error 104)".to_string(),
            ))
        });
        Ok(ScanSession::new(tx, handle, CancellationToken::new()))
    }

    async fn ping(&self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Never finishes connecting, like a daemon that accepts and then stalls.
#[derive(Clone, Copy, Debug, Default)]
pub struct HangingScanner;

#[async_trait]
impl VirusScanner for HangingScanner {
    async fn open_session(&self) -> Result<ScanSession, ScanError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), ScanError> {
        std::future::pending().await
    }
}
