//! Corpus row (spec §3 Chunk).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A retrievable unit of text. `node_id` is the primary key, conventionally
/// `<source-scheme>://<uri>#<chunk-index>`. Never mutated in place:
/// re-ingestion upserts by `node_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub node_id: String,
    pub text: String,
    /// Present iff this chunk has been embedded; cardinality must equal the
    /// configured dimension when present.
    pub embedding: Option<Vec<f32>>,
    pub agent_id: String,
    pub namespace: String,
    pub chunk_index: i32,
    pub metadata: Value,
}

impl Chunk {
    pub fn new(node_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            text: text.into(),
            embedding: None,
            agent_id: super::DEFAULT_AGENT_ID.to_string(),
            namespace: "global".to_string(),
            chunk_index: 0,
            metadata: Value::Null,
        }
    }

    /// Invariant from spec §3: if `embedding` is present, its length must
    /// equal `dim`.
    pub fn embedding_matches_dim(&self, dim: usize) -> bool {
        self.embedding.as_ref().map(|e| e.len() == dim).unwrap_or(true)
    }
}
