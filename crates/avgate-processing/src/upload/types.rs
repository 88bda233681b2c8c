//! Types for the upload pipeline.

use avgate_core::Config;
use avgate_storage::ByteStream;
use std::time::Duration;

/// Bounds applied to every upload task.
#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    /// Deadline for the whole task, from scanner connect to reconciliation
    pub timeout: Duration,
    /// Abort persistence past this many bytes
    pub max_upload_bytes: Option<u64>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.pipeline_timeout(),
            max_upload_bytes: config.max_upload_size_bytes(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_upload_bytes: None,
        }
    }
}

/// One parsed file, as handed over by the endpoint.
pub struct IncomingFile<'a> {
    /// Untrusted client file name
    pub filename: String,
    /// Declared media type; advisory only
    pub media_type: String,
    pub stream: ByteStream<'a>,
}

impl<'a> IncomingFile<'a> {
    pub fn new(
        filename: impl Into<String>,
        media_type: impl Into<String>,
        stream: ByteStream<'a>,
    ) -> Self {
        Self {
            filename: filename.into(),
            media_type: media_type.into(),
            stream,
        }
    }
}

impl std::fmt::Debug for IncomingFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingFile")
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}
