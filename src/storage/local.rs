//! Local mirror of published objects
//!
//! Each object is written to a temp file in the target directory and renamed
//! over the destination, so readers never see a half-written file.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local mirror errors
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// Object key that would escape the mirror directory
    #[error("invalid object key for local mirror: {0}")]
    InvalidKey(String),
}

/// Directory receiving a copy of every published object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMirror {
    dir: PathBuf,
}

impl LocalMirror {
    /// Mirror into `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Mirror directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically write `body` to `<dir>/<key>`
    pub fn write(&self, key: &str, body: &[u8]) -> Result<PathBuf, MirrorError> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(MirrorError::InvalidKey(key.to_string()));
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| MirrorError::IoError(e.to_string()))?;

        let path = self.dir.join(key);
        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| MirrorError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(body)
            .map_err(|e| MirrorError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| MirrorError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&path)
            .map_err(|e| MirrorError::IoError(format!("Failed to persist temp file: {e}")))?;

        debug!(path = %path.display(), bytes = body.len(), "Mirrored object locally");
        Ok(path)
    }
}
