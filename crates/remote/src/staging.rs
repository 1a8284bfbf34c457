//! Scoped staging of upload content on local disk.
//!
//! The upload API takes a file path, so declared content is written to a
//! private temporary directory first. The directory goes away on
//! [`StagedFile::close`] or on drop, whichever comes first.

use std::path::{Path, PathBuf};
use steward_core::error::RemoteError;
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Content written to a temporary file, ready to be uploaded.
pub struct StagedFile {
    dir: TempDir,
    path: PathBuf,
}

impl StagedFile {
    /// Write `content` under `filename`, or under a generated
    /// `data-{uuid}.txt` name when none is given. Directory components of
    /// `filename` are dropped.
    pub fn write(content: &str, filename: Option<&str>) -> Result<Self, RemoteError> {
        let name = filename
            .and_then(|f| Path::new(f).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("data-{}.txt", Uuid::new_v4()));

        let dir = tempfile::Builder::new()
            .prefix("steward-upload-")
            .tempdir()
            .map_err(|e| RemoteError::LocalFile(format!("Failed to create staging directory: {e}")))?;

        let path = dir.path().join(&name);
        std::fs::write(&path, content)
            .map_err(|e| RemoteError::LocalFile(format!("Failed to stage {name}: {e}")))?;

        debug!(path = %path.display(), bytes = content.len(), "Staged upload content");
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file. Failure is logged and otherwise ignored.
    pub fn close(self) {
        let path = self.path;
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to clean up staged upload");
        }
    }
}
