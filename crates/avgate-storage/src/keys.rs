//! Key validation and staging names shared by storage backends.
//!
//! A key is the client supplied file name. It maps to exactly one entry
//! directly under the storage root, so anything that could name a different
//! directory is rejected rather than sanitized.

use crate::traits::{StorageError, StorageResult};
use avgate_core::constants::{MAX_FILENAME_LENGTH, STAGING_DIR_NAME, STAGING_SUFFIX};
use std::path::{Component, Path};
use uuid::Uuid;

/// Validate a client file name for use as a storage key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Filename cannot be empty".to_string()));
    }

    if key.len() > MAX_FILENAME_LENGTH {
        return Err(StorageError::InvalidKey(format!(
            "Filename exceeds {} bytes",
            MAX_FILENAME_LENGTH
        )));
    }

    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "Filename contains a NUL byte".to_string(),
        ));
    }

    if key.contains('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Filename must not contain path separators".to_string(),
        ));
    }

    // Hidden names would collide with the staging area.
    if key.starts_with('.') {
        return Err(StorageError::InvalidKey(
            "Filename must not start with '.'".to_string(),
        ));
    }

    // Catches drive prefixes and anything else the platform treats as more
    // than a single plain component.
    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StorageError::InvalidKey(
            "Filename must be a single path component".to_string(),
        )),
    }
}

/// Staging file name for one upload task.
pub fn staging_file_name(task_id: Uuid) -> String {
    format!("{}.{}", task_id, STAGING_SUFFIX)
}

/// Relative location of the staging directory under the storage root.
pub fn staging_dir() -> &'static str {
    STAGING_DIR_NAME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for name in [
            "report.pdf",
            "a",
            "archive.tar.gz",
            "with space.txt",
            "ünïcode.bin",
            "v1..2.txt",
        ] {
            assert!(validate_key(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_traversal_and_paths() {
        for name in [
            "",
            "../../etc/passwd",
            "..",
            "/etc/passwd",
            "dir/file.txt",
            "dir\\file.txt",
            ".env",
            ".incoming",
            "nul\0byte",
        ] {
            assert!(
                matches!(validate_key(name), Err(StorageError::InvalidKey(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "a".repeat(MAX_FILENAME_LENGTH + 1);
        assert!(validate_key(&name).is_err());
        assert!(validate_key(&"a".repeat(MAX_FILENAME_LENGTH)).is_ok());
    }

    #[test]
    fn staging_names_are_hidden_from_keys() {
        let name = staging_file_name(Uuid::nil());
        assert!(name.ends_with(".part"));
        assert!(validate_key(staging_dir()).is_err());
    }
}
