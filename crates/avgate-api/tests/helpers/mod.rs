//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p avgate-api --test upload_test`.
//! No clamd is needed; the scanner is an in-process double.

#![allow(dead_code)]

use avgate_api::setup::{routes, services::build_state};
use avgate_core::{Config, UploadConfig};
use avgate_services::VirusScanner;
use avgate_storage::{LocalStorage, Storage};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Test application: server plus the storage root it writes to.
pub struct TestApp {
    pub server: TestServer,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn upload_dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Path a stored upload would have.
    pub fn stored_path(&self, filename: &str) -> PathBuf {
        self.upload_dir().join(filename)
    }

    /// Files currently in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir().join(".incoming"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Setup a test app with default configuration and `scanner`.
pub async fn setup_test_app(scanner: Arc<dyn VirusScanner>) -> TestApp {
    setup_test_app_with(scanner, |_| {}).await
}

/// Setup a test app, letting the caller adjust configuration first.
pub async fn setup_test_app_with(
    scanner: Arc<dyn VirusScanner>,
    configure: impl FnOnce(&mut UploadConfig),
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

    let mut upload = UploadConfig::with_upload_dir(temp_dir.path());
    configure(&mut upload);
    let config = Config(Box::new(upload));

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to create local storage"),
    );

    let state = Arc::new(build_state(config.clone(), storage, scanner));
    let router = routes::setup_routes(&config, state).expect("Failed to build routes");
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        _temp_dir: temp_dir,
    }
}

/// Multipart form with a single `file` field.
pub fn file_form(filename: &str, mime_type: &str, data: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part("file", file_part(filename, mime_type, data))
}

pub fn file_part(filename: &str, mime_type: &str, data: Vec<u8>) -> Part {
    Part::bytes(bytes::Bytes::from(data))
        .file_name(filename.to_string())
        .mime_type(mime_type.to_string())
}
