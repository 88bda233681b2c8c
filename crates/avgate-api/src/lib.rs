//! avgate API Library
//!
//! This crate provides the HTTP upload endpoint, the health check and the
//! application setup around the scan-and-store pipeline.

mod handlers;
mod utils;

pub mod error;
pub mod setup;
pub mod state;

// Re-exports
pub use error::HttpAppError;
pub use state::AppState;
