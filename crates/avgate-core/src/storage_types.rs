use serde::Serialize;
use std::path::PathBuf;

/// An upload whose bytes are durably written to the staging area.
///
/// It is not addressable under its destination name until it is promoted.
/// It is defined in core because both the storage backends and the upload task
/// carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    /// Root-relative destination name the object will be promoted to.
    pub key: String,
    /// Absolute path of the staging file.
    pub staging_path: PathBuf,
    pub size_bytes: u64,
}

/// A promoted object, readable under the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}
