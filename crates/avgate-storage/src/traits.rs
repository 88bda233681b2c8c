//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use avgate_core::{AppError, StagedObject, StoredObject};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Inbound byte stream handed to a sink.
///
/// Borrowed streams are allowed: a multipart field only lives as long as the
/// request that carries it.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// The inbound stream failed while it was being written.
    #[error("Source stream failed: {0}")]
    SourceFailed(String),

    #[error("Upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(msg) => AppError::InvalidFilename(msg),
            StorageError::SourceFailed(msg) => AppError::StreamInterrupted(msg),
            StorageError::TooLarge { limit } => AppError::PayloadTooLarge(format!(
                "File exceeds the maximum upload size of {} bytes",
                limit
            )),
            StorageError::UploadFailed(msg) => AppError::WriteError(msg),
            StorageError::IoError(e) => AppError::WriteError(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// The upload pipeline only talks to this trait, so the byte sink can be
/// swapped (tests use a failing writer) without touching the coordinator.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stream `source` into a staging artifact for `key`.
    ///
    /// The key is validated before anything is written. On success the
    /// staging file is flushed to disk and closed; on any failure it has been
    /// removed. `max_bytes` aborts the write with `TooLarge` once exceeded.
    async fn stage_stream(
        &self,
        task_id: Uuid,
        key: &str,
        source: ByteStream<'_>,
        max_bytes: Option<u64>,
    ) -> StorageResult<StagedObject>;

    /// Atomically move a staged artifact to its final key.
    ///
    /// Replaces any existing object with the same key (last writer wins).
    async fn promote(&self, staged: &StagedObject) -> StorageResult<StoredObject>;

    /// Remove a staged artifact without publishing it. Missing files are not an error.
    async fn discard(&self, staged: &StagedObject) -> StorageResult<()>;

    /// Delete a published object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a published object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Read a published object
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Path a key would be published at, after validation.
    fn resolve(&self, key: &str) -> StorageResult<PathBuf>;
}
