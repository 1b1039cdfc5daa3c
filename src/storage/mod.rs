//! Storage backends for snapshot persistence

mod file;

pub use file::FileSnapshotStore;

use async_trait::async_trait;

use crate::error::Result;

/// Persistence provider for serialized snapshots.
///
/// Implementations may target any durable medium; the default is a local
/// structured file. `read` returns `None` when no snapshot has been written
/// yet, which callers treat as empty state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Durably write a serialized snapshot, replacing any previous one
    async fn write(&self, blob: &[u8]) -> Result<()>;

    /// Read the current snapshot, if one exists
    async fn read(&self) -> Result<Option<Vec<u8>>>;
}
