use crate::{LocalStorage, Storage, StorageResult};
use avgate_core::Config;
use std::sync::Arc;

/// Create the storage backend rooted at the configured upload directory
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let storage = LocalStorage::new(config.upload_dir().clone()).await?;
    Ok(Arc::new(storage))
}
