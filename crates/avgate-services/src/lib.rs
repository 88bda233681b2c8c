//! avgate Services Layer
//!
//! This crate hosts the scanning channel: the `VirusScanner` seam the upload
//! pipeline feeds, the per-upload `ScanSession`, and the clamd client behind
//! them. Keep protocol details here; the pipeline only sees sessions and
//! verdicts.

pub mod services;

#[cfg(feature = "clamav")]
pub use services::clamav::ClamAVService;
pub use services::scanner::{ScanError, ScanSession, VirusScanner};
