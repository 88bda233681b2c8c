//! avgate Core Library
//!
//! This crate provides the domain models, error types and configuration shared
//! by the storage, scanning, pipeline and HTTP crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, UploadConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    FileInfo, ScanSummary, ScanVerdict, UploadOutcome, UploadReport, UploadResponse, UploadTask,
};
pub use storage_types::{StagedObject, StoredObject};
