#[cfg(feature = "clamav")]
pub mod clamav;
pub mod scanner;

#[cfg(feature = "clamav")]
pub use clamav::ClamAVService;
pub use scanner::{ScanError, ScanSession, VirusScanner};
