//! Concurrency-safe facade over the memory store

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::MemoryConfig;
use crate::embedding::{EmbeddingIndex, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::memory::{MemoryStats, MemoryStore, SearchResult};
use crate::record::{MemoryRecord, Role};
use crate::registry::ProcedureRegistry;
use crate::snapshot::{PersistenceCodec, RestoreReport};
use crate::storage::{FileSnapshotStore, SnapshotStore};

/// Facade lifecycle.
///
/// There is no failed state: an initialization error is returned to the
/// caller and the facade drops back to `Uninitialized` for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
}

struct FacadeInner {
    store: MemoryStore,
    lifecycle: Lifecycle,
}

/// Concurrency-safe entry point to the memory system.
///
/// One mutex guards the store for the full duration of every operation, so
/// callers sharing a facade through an `Arc` observe a total order. The
/// first operation lazily loads a persisted snapshot when a snapshot store
/// is configured; `close` flushes state back out.
pub struct MemoryFacade {
    config: MemoryConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    registry: ProcedureRegistry,
    storage: Option<Arc<dyn SnapshotStore>>,
    inner: Mutex<FacadeInner>,
}

impl MemoryFacade {
    /// Create a facade with no embedding provider and no persistence
    pub fn new(config: MemoryConfig) -> Self {
        Self::assemble(config, None, ProcedureRegistry::new(), None)
    }

    /// Attach an embedding provider (consuming builder, call before use)
    pub fn with_embedding_provider(self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::assemble(self.config, Some(provider), self.registry, self.storage)
    }

    /// Attach a procedure registry (consuming builder, call before use)
    pub fn with_registry(self, registry: ProcedureRegistry) -> Self {
        Self::assemble(self.config, self.provider, registry, self.storage)
    }

    /// Attach a snapshot store (consuming builder, call before use)
    pub fn with_snapshot_store(self, storage: Arc<dyn SnapshotStore>) -> Self {
        Self::assemble(self.config, self.provider, self.registry, Some(storage))
    }

    /// Attach the default local-file snapshot store under the data directory
    pub fn with_default_storage(self) -> Result<Self> {
        self.config.ensure_dirs()?;
        let storage = FileSnapshotStore::new(self.config.snapshot_path())?;
        Ok(self.with_snapshot_store(Arc::new(storage)))
    }

    fn assemble(
        config: MemoryConfig,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        registry: ProcedureRegistry,
        storage: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let index = provider.clone().map(EmbeddingIndex::new);
        let store = MemoryStore::new(config.clone(), index, registry.clone());

        Self {
            config,
            provider,
            registry,
            storage,
            inner: Mutex::new(FacadeInner {
                store,
                lifecycle: Lifecycle::Uninitialized,
            }),
        }
    }

    /// Current lifecycle state
    pub async fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().await.lifecycle
    }

    /// Append a conversational message
    pub async fn add_message(&self, role: Role, text: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.add_message(role, text);
        Ok(())
    }

    /// Get working-tier messages in insertion order
    pub async fn get_messages(&self, limit: Option<usize>) -> Result<Vec<MemoryRecord>> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        Ok(inner.store.get_messages(limit))
    }

    /// Upsert a knowledge record
    pub async fn store_knowledge(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.store_knowledge(key, value, metadata).await
    }

    /// Look up a knowledge record by key
    pub async fn retrieve_knowledge(&self, key: &str) -> Result<MemoryRecord> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.retrieve_knowledge(key)
    }

    /// Rank knowledge records against a query
    pub async fn search_knowledge(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.search_semantic(query, k).await
    }

    /// Upsert a procedure reference
    pub async fn store_procedure(
        &self,
        name: impl Into<String>,
        reference: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.store_procedure(name, reference, metadata)
    }

    /// Look up a procedure record by name
    pub async fn retrieve_procedure(&self, name: &str) -> Result<MemoryRecord> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.retrieve_procedure(name)
    }

    /// Append an experience to the episodic tier
    pub async fn add_experience(
        &self,
        payload: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<uuid::Uuid> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        Ok(inner.store.add_experience(payload, metadata).await)
    }

    /// Get episodic entries most-recent-first, optionally filtered
    pub async fn retrieve_experiences(
        &self,
        predicate: Option<&(dyn Fn(&MemoryRecord) -> bool + Send + Sync)>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        Ok(inner.store.retrieve_experiences(predicate, limit))
    }

    /// Rank episodic records against a query
    pub async fn search_experiences(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.search_episodic(query, k).await
    }

    /// Empty all four tiers
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        inner.store.clear();
        Ok(())
    }

    /// Per-tier record counts
    pub async fn stats(&self) -> Result<MemoryStats> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        Ok(inner.store.stats())
    }

    /// Write the current state through the configured snapshot store
    pub async fn save(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(&mut inner).await?;
        self.flush(&inner.store).await
    }

    /// Reload state from the configured snapshot store.
    ///
    /// The snapshot is fully decoded before any tier is touched; a corrupt
    /// read leaves in-memory state exactly as it was. A missing snapshot
    /// leaves the tiers unchanged.
    pub async fn load(&self) -> Result<RestoreReport> {
        let mut inner = self.inner.lock().await;
        let report = Self::load_into(self.storage.as_deref(), &mut inner.store, true).await?;
        inner.lifecycle = Lifecycle::Ready;
        Ok(report)
    }

    /// Flush state and end the session.
    ///
    /// A facade that never initialized has nothing to flush; its empty
    /// tiers must not replace an existing snapshot.
    pub async fn close(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.lifecycle == Lifecycle::Ready && self.storage.is_some() {
            self.flush(&inner.store).await?;
        }
        info!("Memory facade closed");
        Ok(())
    }

    async fn flush(&self, store: &MemoryStore) -> Result<()> {
        let storage = self
            .storage
            .as_deref()
            .ok_or_else(|| Error::provider("no persistence target configured"))?;

        let snapshot = PersistenceCodec::snapshot(store);
        let bytes = PersistenceCodec::encode(&snapshot)?;
        storage.write(&bytes).await
    }

    /// Drive the lazy `Uninitialized -> Initializing -> Ready` transition
    async fn ensure_ready(&self, inner: &mut FacadeInner) -> Result<()> {
        if inner.lifecycle == Lifecycle::Ready {
            return Ok(());
        }

        inner.lifecycle = Lifecycle::Initializing;
        match Self::load_into(self.storage.as_deref(), &mut inner.store, false).await {
            Ok(report) => {
                inner.lifecycle = Lifecycle::Ready;
                if report.restored > 0 || report.skipped > 0 {
                    info!(
                        restored = report.restored,
                        skipped = report.skipped,
                        "Memory initialized from snapshot"
                    );
                } else {
                    info!("Memory initialized empty");
                }
                Ok(())
            }
            Err(e) => {
                inner.lifecycle = Lifecycle::Uninitialized;
                warn!(error = %e, "Memory initialization failed, will retry on next call");
                Err(e)
            }
        }
    }

    async fn load_into(
        storage: Option<&dyn SnapshotStore>,
        store: &mut MemoryStore,
        explicit: bool,
    ) -> Result<RestoreReport> {
        let Some(storage) = storage else {
            return if explicit {
                Err(Error::provider("no persistence target configured"))
            } else {
                Ok(RestoreReport::default())
            };
        };

        let Some(bytes) = storage.read().await? else {
            return Ok(RestoreReport::default());
        };

        let snapshot = PersistenceCodec::decode(&bytes)?;
        let (contents, report) = PersistenceCodec::restore(snapshot, store.registry())?;
        store.replace_tiers(contents);
        Ok(report)
    }
}
