//! Storage setup and initialization

use anyhow::{Context, Result};
use avgate_core::Config;
use avgate_storage::{create_storage, Storage};
use std::sync::Arc;

/// Create the storage root (and its staging directory) before serving.
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage abstraction...");
    let storage = create_storage(config)
        .await
        .with_context(|| format!("Failed to prepare UPLOAD_DIR {}", config.upload_dir().display()))?;
    tracing::info!(
        upload_dir = %config.upload_dir().display(),
        "Storage abstraction initialized successfully"
    );

    Ok(storage)
}
