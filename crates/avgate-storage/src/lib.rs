//! avgate Storage Library
//!
//! This crate provides the durable byte sink used by the upload pipeline: the
//! `Storage` trait and its local filesystem implementation.
//!
//! # Two-phase writes
//!
//! Uploads never write to their final name directly. Bytes are streamed into a
//! staging file under `{root}/.incoming/{task_id}.part`, flushed and closed, and
//! only then either promoted (atomic rename to `{root}/{filename}`) or discarded.
//! Final keys are bare file names: a single plain path component with no NUL
//! byte and no leading `.`. Validation is centralized in the `keys` module.

pub mod factory;
pub mod keys;
pub mod local;
pub mod staging;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use local::LocalStorage;
pub use staging::StagingGuard;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
