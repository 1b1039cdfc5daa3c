//! Local file snapshot storage

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::SnapshotStore;

/// Snapshot storage backed by a single local JSON file.
///
/// Writes go to a temporary sibling first and land via rename, so a crash
/// mid-write leaves the previous snapshot intact.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a file store, ensuring the parent directory exists
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// The snapshot file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn write(&self, blob: &[u8]) -> Result<()> {
        let temp = self.temp_path();
        tokio::fs::write(&temp, blob)
            .await
            .map_err(|e| Error::provider(format!("snapshot write failed: {}", e)))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Error::provider(format!("snapshot rename failed: {}", e)))?;

        debug!(path = %self.path.display(), bytes = blob.len(), "Snapshot written");
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::provider(format!("snapshot read failed: {}", e))),
        }
    }
}
