//! Configuration for strata-memory

use std::path::PathBuf;

/// Configuration for the memory system
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Base directory for snapshot storage
    pub data_dir: PathBuf,

    /// Maximum number of records held in the working tier
    pub working_limit: usize,

    /// Maximum number of records held in the episodic tier
    pub episodic_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata-memory");

        Self {
            data_dir,
            working_limit: 50,
            episodic_limit: 500,
        }
    }
}

impl MemoryConfig {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the working tier capacity
    pub fn with_working_limit(mut self, limit: usize) -> Self {
        self.working_limit = limit;
        self
    }

    /// Set the episodic tier capacity
    pub fn with_episodic_limit(mut self, limit: usize) -> Self {
        self.episodic_limit = limit;
        self
    }

    /// Get the path to the snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
