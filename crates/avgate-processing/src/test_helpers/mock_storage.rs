//! Storage doubles.

use async_trait::async_trait;
use avgate_core::{StagedObject, StoredObject};
use avgate_storage::keys::{staging_dir, staging_file_name};
use avgate_storage::{ByteStream, LocalStorage, StagingGuard, Storage, StorageError, StorageResult};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local storage whose writes fail once `fail_after` bytes have arrived,
/// like a disk filling up mid-upload.
///
/// Bytes up to the limit really land in the staging file, so callers can
/// check that the partial file is cleaned up.
#[derive(Clone, Debug)]
pub struct FailingStorage {
    inner: LocalStorage,
    fail_after: u64,
}

impl FailingStorage {
    pub fn new(inner: LocalStorage, fail_after: u64) -> Self {
        Self { inner, fail_after }
    }
}

fn disk_full() -> StorageError {
    StorageError::UploadFailed("No space left on device (os error 28)".to_string())
}

#[async_trait]
impl Storage for FailingStorage {
    async fn stage_stream(
        &self,
        task_id: Uuid,
        key: &str,
        mut source: ByteStream<'_>,
        _max_bytes: Option<u64>,
    ) -> StorageResult<StagedObject> {
        self.inner.resolve(key)?;

        let path = self
            .inner
            .base_path()
            .join(staging_dir())
            .join(staging_file_name(task_id));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let _guard = StagingGuard::new(&path);

        let mut written: u64 = 0;
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| StorageError::SourceFailed(e.to_string()))?;
            let room = self.fail_after.saturating_sub(written) as usize;
            let accepted = &chunk[..chunk.len().min(room)];
            file.write_all(accepted)
                .await
                .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
            file.flush()
                .await
                .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
            written += accepted.len() as u64;

            if accepted.len() < chunk.len() {
                return Err(disk_full());
            }
        }

        Err(disk_full())
    }

    async fn promote(&self, staged: &StagedObject) -> StorageResult<StoredObject> {
        self.inner.promote(staged).await
    }

    async fn discard(&self, staged: &StagedObject) -> StorageResult<()> {
        self.inner.discard(staged).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.read(key).await
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        self.inner.resolve(key)
    }
}
