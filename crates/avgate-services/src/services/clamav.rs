use crate::services::scanner::{parse_signature, ScanError, ScanSession, VirusScanner};
use async_trait::async_trait;
use avgate_core::{Config, ScanVerdict};
use bytes::Bytes;
use clamav_client::clean;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// clamd client speaking INSTREAM over TCP.
#[derive(Clone, Debug)]
pub struct ClamAVService {
    host: String,
    port: u16,
    /// Upper bound for one scan, from session open to verdict
    timeout_secs: u64,
    connect_retries: u32,
    retry_backoff: Duration,
    chunk_size: usize,
    queue_depth: usize,
    /// One permit per blocking-pool thread a clamd conversation may hold
    scan_slots: Arc<Semaphore>,
}

const DEFAULT_MAX_CONCURRENT_SCANS: usize = 256;

/// Run a clamd conversation on the blocking pool.
///
/// clamav-client's tokio futures are !Send, so they cannot be spawned onto the
/// runtime or held across awaits in a handler. The closure only builds the
/// future; it is driven to completion on a blocking thread through the
/// runtime handle, which still provides the I/O driver and timers.
///
/// The thread stays busy until the future finishes, even if the caller has
/// stopped waiting, so the future must bound its own duration. The permit is
/// released together with the thread.
fn run_detached<F, Fut, T>(permit: OwnedSemaphorePermit, make: F) -> JoinHandle<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T>,
    T: Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        handle.block_on(make())
    })
}

impl ClamAVService {
    /// Create a new ClamAVService.
    ///
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 60)
    }

    /// Create with a custom scan timeout (for large files or slow ClamAV instances).
    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
            connect_retries: 3,
            retry_backoff: Duration::from_millis(200),
            chunk_size: 64 * 1024,
            queue_depth: 16,
            scan_slots: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_SCANS)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.clamav_host().to_string(),
            port: config.clamav_port(),
            timeout_secs: config.clamav_timeout().as_secs(),
            connect_retries: config.clamav_connect_retries(),
            retry_backoff: config.clamav_retry_backoff(),
            chunk_size: config.clamav_chunk_size(),
            queue_depth: config.scan_queue_depth(),
            scan_slots: Arc::new(Semaphore::new(config.clamav_max_concurrent_scans())),
        }
    }

    pub fn with_retry(mut self, connect_retries: u32, retry_backoff: Duration) -> Self {
        self.connect_retries = connect_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Cap on clamd conversations running at once.
    pub fn with_max_concurrent_scans(mut self, max: usize) -> Self {
        self.scan_slots = Arc::new(Semaphore::new(max));
        self
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn unavailable(&self, reason: impl Into<String>) -> ScanError {
        ScanError::Unavailable {
            address: self.address(),
            reason: reason.into(),
        }
    }

    /// Wait for a free conversation slot, up to the scan timeout.
    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, ScanError> {
        let wait = Duration::from_secs(self.timeout_secs);
        match tokio::time::timeout(wait, self.scan_slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(ScanError::Failed("ClamAV scan slots closed".to_string())),
            Err(_) => Err(self.unavailable("no free scan slot")),
        }
    }

    /// One PING/PONG round trip.
    async fn ping_once(&self) -> Result<(), ScanError> {
        let permit = self.acquire_slot().await?;
        let address = self.address();
        let limit = Duration::from_secs(self.timeout_secs);
        let ping = run_detached(permit, move || async move {
            let connection = clamav_client::tokio::Tcp {
                host_address: address.as_str(),
            };
            tokio::time::timeout(limit, clamav_client::tokio::ping(connection)).await
        });

        match ping.await {
            Ok(Ok(Ok(reply))) if reply == clamav_client::PONG => Ok(()),
            Ok(Ok(Ok(reply))) => Err(ScanError::MalformedReply(
                String::from_utf8_lossy(&reply).trim().to_string(),
            )),
            Ok(Ok(Err(e))) => Err(self.unavailable(e.to_string())),
            Ok(Err(_)) => Err(self.unavailable("ping timed out")),
            Err(e) => Err(ScanError::Failed(format!("ClamAV ping task failed: {}", e))),
        }
    }

    /// Ping with bounded retries and exponential backoff.
    ///
    /// Only the ping is retried: once upload bytes flow into a session they
    /// cannot be replayed.
    async fn ping_with_retry(&self) -> Result<(), ScanError> {
        let mut attempt = 0;
        loop {
            match self.ping_once().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.connect_retries => {
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        host = %self.host,
                        port = self.port,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "ClamAV not reachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        host = %self.host,
                        port = self.port,
                        attempts = attempt + 1,
                        error = %e,
                        "ClamAV unavailable"
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Turn a raw clamd reply into a verdict.
fn interpret_reply(reply: &[u8]) -> Result<ScanVerdict, ScanError> {
    let text = String::from_utf8_lossy(reply)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string();

    // e.g. "INSTREAM size limit exceeded. ERROR"
    if text.ends_with("ERROR") {
        return Err(ScanError::Failed(text));
    }

    match clean(reply) {
        Ok(true) => Ok(ScanVerdict::Clean { detail: text }),
        Ok(false) if text.ends_with("FOUND") => Ok(ScanVerdict::Infected {
            signature: parse_signature(&text),
            detail: text,
        }),
        Ok(false) => Err(ScanError::MalformedReply(text)),
        Err(e) => Err(ScanError::MalformedReply(format!("{}: {}", e, text))),
    }
}

#[async_trait]
impl VirusScanner for ClamAVService {
    async fn open_session(&self) -> Result<ScanSession, ScanError> {
        self.ping_with_retry().await?;
        let permit = self.acquire_slot().await?;

        let (tx, rx) = mpsc::channel::<Bytes>(self.queue_depth);
        let cancel = CancellationToken::new();
        let watched = cancel.clone();
        let address = self.address();
        let chunk_size = self.chunk_size;
        let timeout_secs = self.timeout_secs;

        let verdict = run_detached(permit, move || async move {
            let start = Instant::now();
            let connection = clamav_client::tokio::Tcp {
                host_address: address.as_str(),
            };
            let input = ReceiverStream::new(rx).map(Ok::<Bytes, io::Error>);
            let scan = clamav_client::tokio::scan_stream(input, connection, Some(chunk_size));

            let reply = tokio::select! {
                _ = watched.cancelled() => {
                    tracing::debug!("ClamAV scan cancelled");
                    return Err(ScanError::Cancelled);
                }
                res = tokio::time::timeout(Duration::from_secs(timeout_secs), scan) => res,
            };

            let reply = match reply {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "ClamAV scan failed");
                    return Err(ScanError::Failed(e.to_string()));
                }
                Err(_) => {
                    tracing::error!(timeout_secs, "ClamAV scan timeout");
                    return Err(ScanError::Timeout(timeout_secs));
                }
            };

            let verdict = interpret_reply(&reply)?;
            match &verdict {
                ScanVerdict::Clean { .. } => tracing::info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "File scan completed: clean"
                ),
                ScanVerdict::Infected { signature, .. } => tracing::warn!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    virus = signature.as_deref().unwrap_or("unknown"),
                    "File scan detected virus"
                ),
            }
            Ok(verdict)
        });

        tracing::debug!(host = %self.host, port = self.port, "Opened ClamAV scan session");
        Ok(ScanSession::new(tx, verdict, cancel))
    }

    async fn ping(&self) -> Result<(), ScanError> {
        self.ping_once().await
    }
}
