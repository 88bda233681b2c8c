use crate::keys::{staging_dir, staging_file_name, validate_key};
use crate::staging::StagingGuard;
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use avgate_core::{StagedObject, StoredObject};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    staging_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for published uploads (e.g., "/var/lib/avgate/uploads")
    ///
    /// The staging directory is created below it.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        let staging_path = base_path.join(staging_dir());

        fs::create_dir_all(&staging_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                staging_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            staging_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a key to its published path with security validation
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        let path = self.base_path.join(key);

        // The key is a single normal component, so its parent must be the root.
        if path.parent() != Some(self.base_path.as_path()) {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    /// Staging files must live directly in the staging directory.
    fn check_staging_path(&self, staged: &StagedObject) -> StorageResult<()> {
        if staged.staging_path.parent() != Some(self.staging_path.as_path()) {
            return Err(StorageError::InvalidKey(format!(
                "Staging path {} is outside the staging directory",
                staged.staging_path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn stage_stream(
        &self,
        task_id: Uuid,
        key: &str,
        mut source: ByteStream<'_>,
        max_bytes: Option<u64>,
    ) -> StorageResult<StagedObject> {
        self.key_to_path(key)?;
        let path = self.staging_path.join(staging_file_name(task_id));
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        let mut guard = StagingGuard::new(&path);

        let mut size_bytes: u64 = 0;
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| StorageError::SourceFailed(e.to_string()))?;

            size_bytes += chunk.len() as u64;
            if let Some(limit) = max_bytes {
                if size_bytes > limit {
                    return Err(StorageError::TooLarge { limit });
                }
            }

            file.write_all(&chunk).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to write stream to file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        file.flush().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to flush file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;
        drop(file);
        guard.disarm();

        tracing::info!(
            path = %path.display(),
            key = %key,
            task_id = %task_id,
            size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage staged upload"
        );

        Ok(StagedObject {
            key: key.to_string(),
            staging_path: path,
            size_bytes,
        })
    }

    async fn promote(&self, staged: &StagedObject) -> StorageResult<StoredObject> {
        self.check_staging_path(staged)?;
        let path = self.key_to_path(&staged.key)?;

        fs::rename(&staged.staging_path, &path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to publish {} as {}: {}",
                staged.staging_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %staged.key,
            size_bytes = staged.size_bytes,
            "Local storage promoted upload"
        );

        Ok(StoredObject {
            key: staged.key.clone(),
            path,
            size_bytes: staged.size_bytes,
        })
    }

    async fn discard(&self, staged: &StagedObject) -> StorageResult<()> {
        self.check_staging_path(staged)?;

        match fs::remove_file(&staged.staging_path).await {
            Ok(()) => {
                tracing::info!(
                    path = %staged.staging_path.display(),
                    key = %staged.key,
                    "Local storage discarded staged upload"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                staged.staging_path.display(),
                e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        fs::read(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        self.key_to_path(key)
    }
}
