//! Record types shared by all memory tiers

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// The memory tier a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Short-lived conversational context, bounded FIFO
    Working,

    /// Recent events and experiences, bounded FIFO
    Episodic,

    /// Keyed knowledge, unbounded, upsert semantics
    Semantic,

    /// Named procedure references, unbounded, upsert semantics
    Procedural,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Working => write!(f, "working"),
            Tier::Episodic => write!(f, "episodic"),
            Tier::Semantic => write!(f, "semantic"),
            Tier::Procedural => write!(f, "procedural"),
        }
    }
}

/// Content payload of a memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryContent {
    /// A conversational message
    Message { role: Role, text: String },

    /// A piece of knowledge, textual or structured
    Knowledge { value: serde_json::Value },

    /// An experience payload from agent execution
    Experience { payload: serde_json::Value },

    /// A symbolic reference into the procedure registry
    Procedure { reference: String },
}

impl MemoryContent {
    /// Extract the text used for embedding, if the content is textual
    pub fn embeddable_text(&self) -> Option<&str> {
        match self {
            MemoryContent::Message { text, .. } => Some(text),
            MemoryContent::Knowledge { value } => value.as_str(),
            MemoryContent::Experience { payload } => payload.as_str(),
            MemoryContent::Procedure { .. } => None,
        }
    }
}

/// A single record held by one of the four tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record ID
    pub id: Uuid,

    /// Tier this record lives in
    pub tier: Tier,

    /// The record content
    pub content: MemoryContent,

    /// When the record was created
    pub timestamp: DateTime<Utc>,

    /// Caller-supplied metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Embedding vector (populated best-effort when an index is configured)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryRecord {
    /// Create a new record for a tier
    pub fn new(tier: Tier, content: MemoryContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            tier,
            content,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            embedding: None,
        }
    }

    /// Create a new conversational message record
    pub fn message(tier: Tier, role: Role, text: impl Into<String>) -> Self {
        Self::new(
            tier,
            MemoryContent::Message {
                role,
                text: text.into(),
            },
        )
    }

    /// Create a new knowledge record
    pub fn knowledge(value: serde_json::Value) -> Self {
        Self::new(Tier::Semantic, MemoryContent::Knowledge { value })
    }

    /// Create a new experience record
    pub fn experience(payload: serde_json::Value) -> Self {
        Self::new(Tier::Episodic, MemoryContent::Experience { payload })
    }

    /// Create a new procedure reference record
    pub fn procedure(reference: impl Into<String>) -> Self {
        Self::new(
            Tier::Procedural,
            MemoryContent::Procedure {
                reference: reference.into(),
            },
        )
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
