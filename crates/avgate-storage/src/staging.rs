use std::path::PathBuf;

/// Removes a staging file when dropped unless disarmed.
///
/// Covers every exit that skips an explicit promote or discard: early
/// returns, errors, and the owning future being dropped on timeout or client
/// disconnect. Removal is synchronous because `Drop` cannot await.
#[derive(Debug)]
pub struct StagingGuard {
    path: Option<PathBuf>,
}

impl StagingGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// The file has been promoted or discarded; leave it alone.
    pub fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed abandoned staging file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove abandoned staging file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_file_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.part");
        std::fs::write(&path, b"partial").unwrap();

        drop(StagingGuard::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn disarmed_guard_keeps_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.part");
        std::fs::write(&path, b"complete").unwrap();

        let mut guard = StagingGuard::new(&path);
        guard.disarm();
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = tempdir().unwrap();
        drop(StagingGuard::new(dir.path().join("never-written.part")));
    }
}
