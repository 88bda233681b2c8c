//! Test helpers for pipeline tests
//!
//! In-process scanners and storage doubles, plus payload fixtures. Enabled
//! for this crate's own tests and, through the `test-helpers` feature, for
//! dependent crates.

pub mod fixtures;
pub mod mock_scanners;
pub mod mock_storage;

pub use fixtures::*;
pub use mock_scanners::*;
pub use mock_storage::*;
