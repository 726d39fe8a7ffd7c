//! C1: typed gateway over Postgres (+pgvector, +FTS, +trigram).
//!
//! `Store` is a trait (grounded on the teacher's `memory::Store` shape: an
//! async, `Send + Sync` trait returning typed errors) so the rest of the
//! system depends on an abstraction; `PgStore` is the production
//! implementation and `MemStore` is an in-memory double used by unit and
//! scenario tests.

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::PgStore;

use crate::error::Result;
use crate::model::{Agent, Chunk, Secret, ToolSpec, Workflow};
use async_trait::async_trait;
use serde_json::Value;

/// One ranked hit from any topk operation. All topk operations return hits
/// sorted descending by `score` (spec §4.1 contract).
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub node_id: String,
    pub text: String,
    pub score: f64,
    pub metadata: Value,
    pub agent_id: String,
    pub namespace: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()>;
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>>;

    /// Nearest neighbors by cosine distance. Implementations MUST order by
    /// the vector column directly (e.g. pgvector's `<=>` operator) so an
    /// HNSW index is usable — spec §4.1 explicitly disallows
    /// `ORDER BY (1 - vec <=> x)`, which defeats the index.
    async fn vector_topk(
        &self,
        vector: &[f32],
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>>;

    /// Full-text search via `ts_rank_cd(tsv, plainto_tsquery('simple', q))`.
    async fn bm25_topk(
        &self,
        query: &str,
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>>;

    /// ILIKE fallback over tokenized terms (≤6 tokens), trigram-accelerated
    /// when available.
    async fn ilike_topk(
        &self,
        tokens: &[String],
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>>;

    /// Last-resort trigram similarity fallback used by the retriever's
    /// timeout path (spec §4.3 failure semantics).
    async fn trigram_topk(
        &self,
        query: &str,
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>>;

    async fn list_agents(&self, namespace: &str) -> Result<Vec<Agent>>;
    async fn get_agent(&self, id: &str) -> Result<Agent>;
    async fn upsert_agent(&self, agent: &Agent) -> Result<()>;

    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;
    async fn get_tool(&self, name: &str) -> Result<ToolSpec>;
    async fn upsert_tool(&self, tool: &ToolSpec) -> Result<()>;

    async fn list_workflows(&self, namespace: &str) -> Result<Vec<Workflow>>;
    async fn get_workflow(&self, id: &str) -> Result<Workflow>;
    async fn upsert_workflow(&self, workflow: &Workflow) -> Result<()>;

    async fn append_run(&self, run: &crate::model::RunRecord) -> Result<()>;

    /// Inserts a new secret version. Old versions are never deleted by this
    /// call — rotation retains them until [`Store::prune_secret_versions`]
    /// is told it's safe (spec §3 Secret invariant).
    async fn put_secret(&self, secret: &Secret) -> Result<()>;

    /// The highest `version` row for `(scope, key_name)`.
    async fn get_secret_latest(&self, scope: &str, key_name: &str) -> Result<Secret>;
    async fn get_secret_version(&self, scope: &str, key_name: &str, version: i32) -> Result<Secret>;

    /// Latest version of every key in `scope`.
    async fn list_secrets(&self, scope: &str) -> Result<Vec<Secret>>;

    /// Drops every version of `(scope, key_name)` strictly older than
    /// `keep_from_version`, once the caller has confirmed no in-flight run
    /// still pins an older version.
    async fn prune_secret_versions(&self, scope: &str, key_name: &str, keep_from_version: i32) -> Result<()>;

    /// Appends a structured error event to the bounded recent-errors ring
    /// (spec §7: "the last 100 are readable via `/api/recent_errors`").
    async fn record_error(&self, kind: crate::error::ErrorKind, message: &str) -> Result<()>;
    async fn recent_errors(&self, n: usize) -> Result<Vec<ErrorEvent>>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub kind: crate::error::ErrorKind,
    pub message: String,
}
