//! # Strata Memory
//!
//! A tiered, in-process memory system for AI agents.
//!
//! ## Architecture
//!
//! Memory is partitioned into four tiers:
//! - **Working** - short-lived conversational context, bounded FIFO
//! - **Episodic** - recent events and experiences, bounded FIFO
//! - **Semantic** - keyed knowledge with upsert semantics
//! - **Procedural** - named references into a procedure registry
//!
//! Similarity search ranks embedded records by cosine similarity through a
//! pluggable [`embedding::EmbeddingProvider`]. Durability is a whole-state
//! snapshot written through a pluggable [`storage::SnapshotStore`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_memory::{MemoryConfig, MemoryFacade, Role};
//!
//! let facade = MemoryFacade::new(MemoryConfig::default()).with_default_storage()?;
//!
//! // Record a conversation turn
//! facade.add_message(Role::User, "what did we decide yesterday?").await?;
//!
//! // Store and search knowledge
//! facade.store_knowledge("team", serde_json::json!("platform"), Default::default()).await?;
//! let hits = facade.search_knowledge("which team?", 5).await?;
//!
//! // Flush on the way out
//! facade.close().await?;
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod eviction;
pub mod facade;
pub mod memory;
pub mod record;
pub mod registry;
pub mod snapshot;
pub mod storage;

pub use config::MemoryConfig;
pub use embedding::{cosine_similarity, EmbeddingIndex, EmbeddingProvider, HashingEmbedder};
pub use error::{Error, Result};
pub use facade::{Lifecycle, MemoryFacade};
pub use memory::{MemoryStats, MemoryStore, SearchResult};
pub use record::{MemoryContent, MemoryRecord, Role, Tier};
pub use registry::{Procedure, ProcedureRegistry};
pub use snapshot::{MemorySnapshot, PersistenceCodec, RestoreReport};
pub use storage::{FileSnapshotStore, SnapshotStore};

#[cfg(feature = "embeddings")]
pub use embedding::FastembedProvider;
