//! Service initialization and application state setup

use crate::state::AppState;
use anyhow::Result;
use avgate_core::Config;
use avgate_processing::{PipelineSettings, UploadPipeline};
use avgate_services::{ClamAVService, VirusScanner};
use avgate_storage::Storage;
use std::sync::Arc;

/// Build the process-wide scanner and the pipeline, returning the application state
pub async fn initialize_services(
    config: &Config,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    tracing::info!(
        host = %config.clamav_host(),
        port = config.clamav_port(),
        timeout_secs = config.clamav_timeout().as_secs(),
        connect_retries = config.clamav_connect_retries(),
        "ClamAV scanning enabled (fail-closed)"
    );
    let clamav = ClamAVService::from_config(config);

    // clamd may still be loading signatures; uploads retry the connection on their own.
    match clamav.ping().await {
        Ok(()) => tracing::info!("ClamAV daemon reachable"),
        Err(e) => tracing::warn!(error = %e, "ClamAV daemon not reachable at startup"),
    }

    let scanner: Arc<dyn VirusScanner> = Arc::new(clamav);
    Ok(Arc::new(build_state(config.clone(), storage, scanner)))
}

/// Assemble the state from already-built collaborators.
pub fn build_state(
    config: Config,
    storage: Arc<dyn Storage>,
    scanner: Arc<dyn VirusScanner>,
) -> AppState {
    let settings = PipelineSettings::from_config(&config);
    tracing::debug!(
        timeout_secs = settings.timeout.as_secs(),
        max_upload_bytes = ?settings.max_upload_bytes,
        "Upload pipeline configured"
    );
    AppState::new(config, UploadPipeline::new(storage, scanner, settings))
}
