//! The hierarchical memory store and its four tiers

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::embedding::EmbeddingIndex;
use crate::error::{Error, Result};
use crate::eviction::FifoEviction;
use crate::record::{MemoryRecord, Role, Tier};
use crate::registry::ProcedureRegistry;

/// A record returned by similarity search, with its score
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Per-tier record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub working: usize,
    pub episodic: usize,
    pub semantic: usize,
    pub procedural: usize,
}

/// Complete tier contents, used to swap in a restored state atomically
#[derive(Debug, Default)]
pub struct TierContents {
    pub working: VecDeque<MemoryRecord>,
    pub episodic: VecDeque<MemoryRecord>,
    pub semantic: HashMap<String, MemoryRecord>,
    pub procedural: HashMap<String, MemoryRecord>,
}

/// The hierarchical memory store.
///
/// Owns the four tiers. Working and episodic are bounded insertion-order
/// queues; semantic and procedural are keyed maps with upsert semantics.
/// Not synchronized: callers go through [`crate::facade::MemoryFacade`].
pub struct MemoryStore {
    config: MemoryConfig,
    working: VecDeque<MemoryRecord>,
    episodic: VecDeque<MemoryRecord>,
    semantic: HashMap<String, MemoryRecord>,
    procedural: HashMap<String, MemoryRecord>,
    working_eviction: FifoEviction,
    episodic_eviction: FifoEviction,
    index: Option<EmbeddingIndex>,
    registry: ProcedureRegistry,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(
        config: MemoryConfig,
        index: Option<EmbeddingIndex>,
        registry: ProcedureRegistry,
    ) -> Self {
        let working_eviction = FifoEviction::new(config.working_limit);
        let episodic_eviction = FifoEviction::new(config.episodic_limit);

        Self {
            config,
            working: VecDeque::new(),
            episodic: VecDeque::new(),
            semantic: HashMap::new(),
            procedural: HashMap::new(),
            working_eviction,
            episodic_eviction,
            index,
            registry,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Get the embedding index, if one is configured
    pub fn index(&self) -> Option<&EmbeddingIndex> {
        self.index.as_ref()
    }

    /// Get the procedure registry
    pub fn registry(&self) -> &ProcedureRegistry {
        &self.registry
    }

    /// Append a conversational message to the working and episodic tiers.
    ///
    /// Both bounds are enforced before the call returns.
    pub fn add_message(&mut self, role: Role, text: impl Into<String>) {
        let text = text.into();

        let working_record = MemoryRecord::message(Tier::Working, role, text.clone());
        self.working_eviction
            .push(&mut self.working, working_record);

        let episodic_record = MemoryRecord::message(Tier::Episodic, role, text);
        self.episodic_eviction
            .push(&mut self.episodic, episodic_record);
    }

    /// Append an experience to the episodic tier.
    ///
    /// Textual payloads are embedded best-effort when an index is configured;
    /// an embedding failure degrades to no vector and the write still lands.
    pub async fn add_experience(
        &mut self,
        payload: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> uuid::Uuid {
        let mut record = MemoryRecord::experience(payload).with_metadata(metadata);

        if let Some(text) = record.content.embeddable_text() {
            if let Some(vector) = self.try_embed(text).await {
                record.embedding = Some(vector);
            }
        }

        let id = record.id;
        debug!(record_id = %id, "Adding experience");
        self.episodic_eviction.push(&mut self.episodic, record);
        id
    }

    /// Upsert a knowledge record under a key.
    ///
    /// Textual values are embedded best-effort when an index is configured.
    pub async fn store_knowledge(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::validation("knowledge key must not be empty"));
        }

        let mut record = MemoryRecord::knowledge(value).with_metadata(metadata);

        if let Some(text) = record.content.embeddable_text() {
            if let Some(vector) = self.try_embed(text).await {
                record.embedding = Some(vector);
            }
        }

        debug!(key = %key, "Storing knowledge");
        self.semantic.insert(key, record);
        Ok(())
    }

    /// Upsert a procedure reference under a name.
    ///
    /// The reference must resolve in the procedure registry.
    pub fn store_procedure(
        &mut self,
        name: impl Into<String>,
        reference: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let name = name.into();
        let reference = reference.into();

        if name.is_empty() {
            return Err(Error::validation("procedure name must not be empty"));
        }
        if !self.registry.contains(&reference) {
            return Err(Error::validation(format!(
                "procedure reference '{}' is not registered",
                reference
            )));
        }

        let record = MemoryRecord::procedure(reference).with_metadata(metadata);
        debug!(name = %name, "Storing procedure reference");
        self.procedural.insert(name, record);
        Ok(())
    }

    /// Get working-tier messages in insertion order.
    ///
    /// With a limit, returns the most recent `limit` entries.
    pub fn get_messages(&self, limit: Option<usize>) -> Vec<MemoryRecord> {
        let skip = limit
            .map(|n| self.working.len().saturating_sub(n))
            .unwrap_or(0);
        self.working.iter().skip(skip).cloned().collect()
    }

    /// Look up a knowledge record by key
    pub fn retrieve_knowledge(&self, key: &str) -> Result<MemoryRecord> {
        self.semantic
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("knowledge key '{}'", key)))
    }

    /// Look up a procedure record by name
    pub fn retrieve_procedure(&self, name: &str) -> Result<MemoryRecord> {
        self.procedural
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("procedure '{}'", name)))
    }

    /// Get episodic entries most-recent-first, optionally filtered
    pub fn retrieve_experiences(
        &self,
        predicate: Option<&(dyn Fn(&MemoryRecord) -> bool + Send + Sync)>,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        self.episodic
            .iter()
            .rev()
            .filter(|record| predicate.map(|p| p(record)).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Rank semantic-tier records against a query by cosine similarity
    pub async fn search_semantic(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed_query(query).await?;
        self.rank(self.semantic.values(), &query_vector, k)
    }

    /// Rank episodic-tier records against a query by cosine similarity
    pub async fn search_episodic(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed_query(query).await?;
        self.rank(self.episodic.iter(), &query_vector, k)
    }

    /// Empty all four tiers
    pub fn clear(&mut self) {
        debug!("Clearing all memory tiers");
        self.working.clear();
        self.episodic.clear();
        self.semantic.clear();
        self.procedural.clear();
    }

    /// Per-tier record counts
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            working: self.working.len(),
            episodic: self.episodic.len(),
            semantic: self.semantic.len(),
            procedural: self.procedural.len(),
        }
    }

    /// Working tier contents, oldest first
    pub fn working(&self) -> &VecDeque<MemoryRecord> {
        &self.working
    }

    /// Episodic tier contents, oldest first
    pub fn episodic(&self) -> &VecDeque<MemoryRecord> {
        &self.episodic
    }

    /// Semantic tier contents
    pub fn semantic(&self) -> &HashMap<String, MemoryRecord> {
        &self.semantic
    }

    /// Procedural tier contents
    pub fn procedural(&self) -> &HashMap<String, MemoryRecord> {
        &self.procedural
    }

    /// Replace all tier contents at once.
    ///
    /// Restore paths build a full [`TierContents`] first so a failed decode
    /// never leaves the store partially patched. Bounds are re-enforced in
    /// case the incoming state was produced under larger limits.
    pub fn replace_tiers(&mut self, contents: TierContents) {
        let TierContents {
            working,
            episodic,
            semantic,
            procedural,
        } = contents;

        self.working.clear();
        for record in working {
            self.working_eviction.push(&mut self.working, record);
        }

        self.episodic.clear();
        for record in episodic {
            self.episodic_eviction.push(&mut self.episodic, record);
        }

        self.semantic = semantic;
        self.procedural = procedural;
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| Error::provider("no embedding provider configured"))?;
        index.embed(query).await
    }

    /// Best-effort embedding: a provider failure is logged, not raised
    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        let index = self.index.as_ref()?;
        match index.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Embedding failed, storing record without vector");
                None
            }
        }
    }

    /// Top-k records by cosine similarity, ties broken by recency.
    ///
    /// Records without an embedding are excluded from ranking.
    fn rank<'a>(
        &self,
        records: impl Iterator<Item = &'a MemoryRecord>,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| Error::provider("no embedding provider configured"))?;

        let mut results = Vec::new();
        for record in records {
            let Some(embedding) = record.embedding.as_ref() else {
                continue;
            };
            let score = index.similarity(query_vector, embedding)?;
            results.push(SearchResult {
                record: record.clone(),
                score,
            });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
        });
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::record::MemoryContent;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Maps known phrases to fixed vectors so scores are exact
    struct StubProvider;

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            Ok(match text {
                "north" => vec![1.0, 0.0],
                "northeast" => vec![1.0, 1.0],
                "east" => vec![0.0, 1.0],
                _ => vec![-1.0, 0.0],
            })
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Always fails, for degraded-write tests
    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _text: &str) -> crate::error::Result<Vec<f32>> {
            Err(Error::provider("backend offline"))
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn store_with(provider: Option<Arc<dyn EmbeddingProvider>>) -> MemoryStore {
        let config = MemoryConfig::with_data_dir("/tmp/unused")
            .with_working_limit(3)
            .with_episodic_limit(2);
        MemoryStore::new(
            config,
            provider.map(EmbeddingIndex::new),
            ProcedureRegistry::new(),
        )
    }

    fn message_texts(records: &[MemoryRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|r| match &r.content {
                MemoryContent::Message { text, .. } => text.as_str(),
                _ => panic!("expected message"),
            })
            .collect()
    }

    #[test]
    fn working_tier_keeps_last_n_in_insertion_order() {
        let mut store = store_with(None);
        for i in 0..7 {
            store.add_message(Role::User, format!("m{i}"));
        }

        let messages = store.get_messages(None);
        assert_eq!(message_texts(&messages), vec!["m4", "m5", "m6"]);
        assert_eq!(store.stats().working, 3);
    }

    #[test]
    fn episodic_example_sequence() {
        let mut store = store_with(None);
        store.add_message(Role::User, "A");
        store.add_message(Role::User, "B");
        store.add_message(Role::User, "C");

        let episodic: Vec<_> = store.episodic().iter().cloned().collect();
        assert_eq!(message_texts(&episodic), vec!["B", "C"]);

        store.add_message(Role::User, "D");
        let episodic: Vec<_> = store.episodic().iter().cloned().collect();
        assert_eq!(message_texts(&episodic), vec!["C", "D"]);
    }

    #[test]
    fn get_messages_with_limit_returns_most_recent() {
        let mut store = store_with(None);
        store.add_message(Role::User, "a");
        store.add_message(Role::Assistant, "b");
        store.add_message(Role::User, "c");

        let messages = store.get_messages(Some(2));
        assert_eq!(message_texts(&messages), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn store_knowledge_upserts_in_place() {
        let mut store = store_with(None);
        store
            .store_knowledge("k", serde_json::json!("v1"), HashMap::new())
            .await
            .unwrap();
        store
            .store_knowledge("k", serde_json::json!("v2"), HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.stats().semantic, 1);
        let record = store.retrieve_knowledge("k").unwrap();
        match record.content {
            MemoryContent::Knowledge { value } => assert_eq!(value, serde_json::json!("v2")),
            _ => panic!("expected knowledge"),
        }
    }

    #[tokio::test]
    async fn empty_knowledge_key_is_rejected() {
        let mut store = store_with(None);
        let err = store
            .store_knowledge("", serde_json::json!("v"), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn retrieve_on_missing_key_is_not_found() {
        let store = store_with(None);
        assert!(matches!(
            store.retrieve_knowledge("absent"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.retrieve_procedure("absent"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn store_procedure_requires_registered_reference() {
        let mut registry = ProcedureRegistry::new();

        struct Noop;
        #[async_trait]
        impl crate::registry::Procedure for Noop {
            async fn run(
                &self,
                input: serde_json::Value,
            ) -> crate::error::Result<serde_json::Value> {
                Ok(input)
            }
        }
        registry.register("summarize", Arc::new(Noop));

        let config = MemoryConfig::with_data_dir("/tmp/unused");
        let mut store = MemoryStore::new(config, None, registry);

        store
            .store_procedure("daily-recap", "summarize", HashMap::new())
            .unwrap();
        let record = store.retrieve_procedure("daily-recap").unwrap();
        assert!(matches!(
            record.content,
            MemoryContent::Procedure { ref reference } if reference == "summarize"
        ));

        let err = store
            .store_procedure("bad", "unregistered", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn retrieve_experiences_is_most_recent_first_and_filtered() {
        let mut store = store_with(None);
        store
            .add_experience(serde_json::json!("first"), HashMap::new())
            .await;
        store
            .add_experience(serde_json::json!("second"), HashMap::new())
            .await;

        let all = store.retrieve_experiences(None, 10);
        assert_eq!(all.len(), 2);
        match &all[0].content {
            MemoryContent::Experience { payload } => {
                assert_eq!(payload, &serde_json::json!("second"))
            }
            _ => panic!("expected experience"),
        }

        let filtered = store.retrieve_experiences(
            Some(&|r: &MemoryRecord| {
                matches!(
                    &r.content,
                    MemoryContent::Experience { payload } if payload == &serde_json::json!("first")
                )
            }),
            10,
        );
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_with_unembedded_excluded() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(StubProvider);
        let mut store = store_with(Some(provider));

        store
            .store_knowledge("a", serde_json::json!("north"), HashMap::new())
            .await
            .unwrap();
        store
            .store_knowledge("b", serde_json::json!("northeast"), HashMap::new())
            .await
            .unwrap();
        store
            .store_knowledge("c", serde_json::json!("east"), HashMap::new())
            .await
            .unwrap();
        // Structured value: no embeddable text, excluded from ranking
        store
            .store_knowledge("d", serde_json::json!({"n": 1}), HashMap::new())
            .await
            .unwrap();

        let results = store.search_semantic("north", 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn search_without_provider_is_a_provider_error() {
        let store = store_with(None);
        let err = store.search_semantic("anything", 5).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn embedding_failure_degrades_but_write_succeeds() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FailingProvider);
        let mut store = store_with(Some(provider));

        store
            .add_experience(serde_json::json!("observation"), HashMap::new())
            .await;
        store
            .store_knowledge("k", serde_json::json!("fact"), HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.stats().episodic, 1);
        assert_eq!(store.stats().semantic, 1);
        assert!(store.episodic()[0].embedding.is_none());
        assert!(store.retrieve_knowledge("k").unwrap().embedding.is_none());
    }

    #[tokio::test]
    async fn clear_empties_all_tiers() {
        let mut store = store_with(None);
        store.add_message(Role::User, "hi");
        store
            .add_experience(serde_json::json!("e"), HashMap::new())
            .await;
        store
            .store_knowledge("k", serde_json::json!("v"), HashMap::new())
            .await
            .unwrap();

        store.clear();
        assert_eq!(store.stats(), MemoryStats::default());
    }
}
