//! File-backed signal store: one JSON document holding every resource's
//! observed snapshot.
//!
//! Storage location: `~/.steward/state.json` unless configured otherwise.
//!
//! Every mutation writes the whole document to a temp file in the same
//! directory and renames it over the old one, so readers see either the
//! previous document or the new one. A document that does not parse is an
//! error, never an empty store: starting empty would recreate every
//! resource already running remotely.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use steward_core::error::HostError;
use steward_core::host::SignalStore;
use tokio::sync::RwLock;
use tracing::debug;

pub struct FileSignalStore {
    path: PathBuf,
    snapshots: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl FileSignalStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open(path: PathBuf) -> Result<Self, HostError> {
        let snapshots = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), resources = snapshots.len(), "Signal store loaded");
        Ok(Self {
            path,
            snapshots: Arc::new(RwLock::new(snapshots)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, serde_json::Value>, HostError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(HostError::Storage(format!(
                    "Failed to read signal state {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            HostError::Storage(format!(
                "Signal state {} is unreadable ({e}); fix or move it aside before syncing",
                path.display()
            ))
        })
    }

    async fn flush(&self, snapshots: &BTreeMap<String, serde_json::Value>) -> Result<(), HostError> {
        let content = serde_json::to_vec_pretty(snapshots)
            .map_err(|e| HostError::Storage(format!("Failed to serialize signal state: {e}")))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &content))
            .await
            .map_err(|e| HostError::Storage(format!("Signal state writer panicked: {e}")))?
    }
}

fn write_atomically(path: &Path, content: &[u8]) -> Result<(), HostError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| HostError::Storage(format!("Failed to create state directory: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| HostError::Storage(format!("Failed to create temp state file: {e}")))?;
    tmp.write_all(content)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| HostError::Storage(format!("Failed to write signal state: {e}")))?;
    tmp.persist(path)
        .map_err(|e| HostError::Storage(format!("Failed to replace signal state: {e}")))?;
    Ok(())
}

#[async_trait]
impl SignalStore for FileSignalStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, resource: &str) -> Result<Option<serde_json::Value>, HostError> {
        Ok(self.snapshots.read().await.get(resource).cloned())
    }

    async fn save(&self, resource: &str, snapshot: serde_json::Value) -> Result<(), HostError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(resource.to_string(), snapshot);
        self.flush(&snapshots).await
    }

    async fn remove(&self, resource: &str) -> Result<bool, HostError> {
        let mut snapshots = self.snapshots.write().await;
        let removed = snapshots.remove(resource).is_some();
        if removed {
            self.flush(&snapshots).await?;
        }
        Ok(removed)
    }

    async fn resources(&self) -> Result<Vec<String>, HostError> {
        Ok(self.snapshots.read().await.keys().cloned().collect())
    }
}
