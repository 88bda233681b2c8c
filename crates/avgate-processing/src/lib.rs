//! avgate Processing Library
//!
//! This crate hosts the streaming fan-out/join at the heart of the service:
//! one inbound byte stream is teed into a scanning session and a storage
//! sink, and the coordinator reports a single outcome once both branches
//! have settled.

pub mod upload;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use upload::{IncomingFile, PipelineSettings, ScanPassthrough, UploadPipeline};
