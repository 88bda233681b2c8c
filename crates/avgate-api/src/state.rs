//! Application state shared by every handler.

use avgate_core::Config;
use avgate_processing::UploadPipeline;
use avgate_services::VirusScanner;
use avgate_storage::Storage;
use std::sync::Arc;

/// Created once at startup and shared via `Arc`.
///
/// The scanner inside the pipeline is process-wide: every upload opens its
/// own clamd conversation through it, so sessions are never pooled.
pub struct AppState {
    pub config: Config,
    pub pipeline: UploadPipeline,
}

impl AppState {
    pub fn new(config: Config, pipeline: UploadPipeline) -> Self {
        Self { config, pipeline }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.pipeline.storage()
    }

    pub fn scanner(&self) -> &Arc<dyn VirusScanner> {
        self.pipeline.scanner()
    }
}
