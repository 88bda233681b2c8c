//! Constants shared across crates.

/// Name of the hidden directory, relative to the storage root, that holds
/// in-flight uploads until their scan verdict is known.
pub const STAGING_DIR_NAME: &str = ".incoming";

/// Suffix of staging files.
pub const STAGING_SUFFIX: &str = "part";

/// Longest accepted destination filename, in bytes.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Outcome messages of the upload response.
pub const MESSAGE_OK: &str = "OK";
pub const MESSAGE_INFECTED: &str = "INFECTED";
pub const MESSAGE_REJECTED: &str = "REJECTED";
