//! Snapshot format and codec for durable persistence

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::memory::{MemoryStore, TierContents};
use crate::record::{MemoryContent, MemoryRecord, Role, Tier};
use crate::registry::ProcedureRegistry;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized memory state: four named collections of raw records.
///
/// Collection entries stay as raw JSON so each record decodes independently;
/// one malformed record never takes down the rest of the load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub working: Vec<serde_json::Value>,
    pub episodic: Vec<serde_json::Value>,
    pub semantic: BTreeMap<String, serde_json::Value>,
    pub procedural: BTreeMap<String, serde_json::Value>,
}

/// One serialized record
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    id: Uuid,
    kind: String,
    content: serde_json::Value,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
    /// False for procedure references that will not resolve after a reload
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    restorable: bool,
}

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_true(value: &bool) -> bool {
    *value
}

/// Outcome of a restore: how many records landed, how many were skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// Converts memory state to and from the durable snapshot format
pub struct PersistenceCodec;

impl PersistenceCodec {
    /// Export the store's tiers as a snapshot.
    ///
    /// A pure function of current tier contents. Procedural records whose
    /// reference does not resolve in the registry are exported with an
    /// explicit non-restorable marker.
    pub fn snapshot(store: &MemoryStore) -> MemorySnapshot {
        let registry = store.registry();

        MemorySnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            working: store
                .working()
                .iter()
                .map(|r| encode_record(r, true))
                .collect(),
            episodic: store
                .episodic()
                .iter()
                .map(|r| encode_record(r, true))
                .collect(),
            semantic: store
                .semantic()
                .iter()
                .map(|(k, r)| (k.clone(), encode_record(r, true)))
                .collect(),
            procedural: store
                .procedural()
                .iter()
                .map(|(k, r)| {
                    let restorable = match &r.content {
                        MemoryContent::Procedure { reference } => registry.contains(reference),
                        _ => true,
                    };
                    (k.clone(), encode_record(r, restorable))
                })
                .collect(),
        }
    }

    /// Reconstruct tier contents from a snapshot.
    ///
    /// Malformed records are skipped with a warning; the returned
    /// [`RestoreReport`] counts both outcomes. The caller swaps the result
    /// into the store in one step, so nothing here touches live tiers.
    pub fn restore(
        snapshot: MemorySnapshot,
        registry: &ProcedureRegistry,
    ) -> Result<(TierContents, RestoreReport)> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::provider(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut contents = TierContents::default();
        let mut report = RestoreReport::default();

        for value in snapshot.working {
            match decode_record(value, Tier::Working) {
                Some(record) => {
                    contents.working.push_back(record);
                    report.restored += 1;
                }
                None => report.skipped += 1,
            }
        }

        for value in snapshot.episodic {
            match decode_record(value, Tier::Episodic) {
                Some(record) => {
                    contents.episodic.push_back(record);
                    report.restored += 1;
                }
                None => report.skipped += 1,
            }
        }

        for (key, value) in snapshot.semantic {
            match decode_record(value, Tier::Semantic) {
                Some(record) => {
                    contents.semantic.insert(key, record);
                    report.restored += 1;
                }
                None => report.skipped += 1,
            }
        }

        for (name, value) in snapshot.procedural {
            match decode_procedure(value, registry, &name) {
                Some(record) => {
                    contents.procedural.insert(name, record);
                    report.restored += 1;
                }
                None => report.skipped += 1,
            }
        }

        Ok((contents, report))
    }

    /// Serialize a snapshot for a storage backend
    pub fn encode(snapshot: &MemorySnapshot) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(snapshot)?)
    }

    /// Parse a snapshot from storage-backend bytes
    pub fn decode(bytes: &[u8]) -> Result<MemorySnapshot> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn encode_record(record: &MemoryRecord, restorable: bool) -> serde_json::Value {
    let (kind, content) = match &record.content {
        MemoryContent::Message { role, text } => (
            "message",
            serde_json::json!({ "role": role, "text": text }),
        ),
        MemoryContent::Knowledge { value } => ("knowledge", value.clone()),
        MemoryContent::Experience { payload } => ("experience", payload.clone()),
        MemoryContent::Procedure { reference } => (
            "procedure",
            serde_json::json!({ "reference": reference }),
        ),
    };

    let snapshot_record = SnapshotRecord {
        id: record.id,
        kind: kind.to_string(),
        content,
        timestamp: record.timestamp,
        metadata: record.metadata.clone(),
        embedding: record.embedding.clone(),
        restorable,
    };

    // SnapshotRecord is a plain data struct; serializing it cannot fail
    serde_json::to_value(snapshot_record).unwrap_or(serde_json::Value::Null)
}

fn decode_record(value: serde_json::Value, tier: Tier) -> Option<MemoryRecord> {
    let raw: SnapshotRecord = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(tier = %tier, error = %e, "Skipping malformed snapshot record");
            return None;
        }
    };

    let content = match raw.kind.as_str() {
        "message" => {
            let role = raw
                .content
                .get("role")
                .and_then(|v| serde_json::from_value::<Role>(v.clone()).ok());
            let text = raw
                .content
                .get("text")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            match (role, text) {
                (Some(role), Some(text)) => MemoryContent::Message { role, text },
                _ => {
                    warn!(tier = %tier, "Skipping message record with malformed content");
                    return None;
                }
            }
        }
        "knowledge" => MemoryContent::Knowledge { value: raw.content },
        "experience" => MemoryContent::Experience { payload: raw.content },
        "procedure" => match raw.content.get("reference").and_then(|v| v.as_str()) {
            Some(reference) => MemoryContent::Procedure {
                reference: reference.to_string(),
            },
            None => {
                warn!(tier = %tier, "Skipping procedure record with malformed content");
                return None;
            }
        },
        other => {
            warn!(tier = %tier, kind = %other, "Skipping snapshot record of unknown kind");
            return None;
        }
    };

    Some(MemoryRecord {
        id: raw.id,
        tier,
        content,
        timestamp: raw.timestamp,
        metadata: raw.metadata,
        embedding: raw.embedding,
    })
}

fn decode_procedure(
    value: serde_json::Value,
    registry: &ProcedureRegistry,
    name: &str,
) -> Option<MemoryRecord> {
    let restorable = value
        .get("restorable")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if !restorable {
        warn!(name = %name, "Dropping non-restorable procedure record");
        return None;
    }

    let record = decode_record(value, Tier::Procedural)?;

    if let MemoryContent::Procedure { reference } = &record.content {
        if !registry.contains(reference) {
            warn!(
                name = %name,
                reference = %reference,
                "Dropping procedure record with unresolved reference"
            );
            return None;
        }
    }

    Some(record)
}
