//! Upload pipeline: tee → scan + persist → join → promote or discard.

pub mod persist_stage;
pub mod pipeline;
pub mod scan_stage;
pub mod types;

pub use pipeline::UploadPipeline;
pub use scan_stage::ScanPassthrough;
pub use types::{IncomingFile, PipelineSettings};
