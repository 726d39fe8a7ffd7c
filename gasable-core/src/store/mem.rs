//! In-memory `Store` double. Grounded on the teacher's `InMemoryStore` /
//! `InMemoryVectorStore` test-double pattern: no I/O, deterministic,
//! `Arc<Mutex<...>>`-guarded shared state, used by unit and scenario tests
//! in `retriever`/`answerer`/`orchestrator`/`workflow` rather than spinning
//! up Postgres.

use super::{ErrorEvent, Hit, Store};
use crate::error::{ErrorKind, GasableError, Result};
use crate::model::{owner_matches, Agent, Chunk, RunRecord, Secret, ToolSpec, Workflow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    chunks: HashMap<String, Chunk>,
    agents: HashMap<String, Agent>,
    tools: HashMap<String, ToolSpec>,
    workflows: HashMap<String, Workflow>,
    runs: Vec<RunRecord>,
    errors: Vec<ErrorEvent>,
    // keyed by (scope, key_name), versions appended in increasing order.
    secrets: HashMap<(String, String), Vec<Secret>>,
}

pub struct MemStore {
    inner: Mutex<Inner>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn visible<'a>(inner: &'a Inner, agent_id: &str, namespace: &str) -> Vec<&'a Chunk> {
        inner
            .chunks
            .values()
            .filter(|c| owner_matches(&c.agent_id, agent_id) && c.namespace == namespace)
            .collect()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)) as f64
}

fn hit_from(c: &Chunk, score: f64) -> Hit {
    Hit {
        node_id: c.node_id.clone(),
        text: c.text.clone(),
        score,
        metadata: c.metadata.clone(),
        agent_id: c.agent_id.clone(),
        namespace: c.namespace.clone(),
    }
}

fn sort_and_truncate(mut hits: Vec<Hit>, k: usize) -> Vec<Hit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.node_id.cmp(&b.node_id)));
    hits.truncate(k);
    hits
}

#[async_trait]
impl Store for MemStore {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for c in chunks {
            inner.chunks.insert(c.node_id.clone(), c.clone());
        }
        Ok(())
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids.iter().filter_map(|id| inner.chunks.get(id).cloned()).collect())
    }

    async fn vector_topk(&self, vector: &[f32], k: usize, agent_id: &str, namespace: &str) -> Result<Vec<Hit>> {
        let inner = self.inner.lock().unwrap();
        let hits = Self::visible(&inner, agent_id, namespace)
            .into_iter()
            .filter_map(|c| c.embedding.as_ref().map(|e| hit_from(c, cosine(vector, e))))
            .collect();
        Ok(sort_and_truncate(hits, k))
    }

    async fn bm25_topk(&self, query: &str, k: usize, agent_id: &str, namespace: &str) -> Result<Vec<Hit>> {
        let terms: Vec<String> = query.split_whitespace().map(|s| s.to_lowercase()).collect();
        let inner = self.inner.lock().unwrap();
        let hits = Self::visible(&inner, agent_id, namespace)
            .into_iter()
            .filter_map(|c| {
                let text = c.text.to_lowercase();
                let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
                if hits == 0 {
                    None
                } else {
                    Some(hit_from(c, hits as f64 / terms.len().max(1) as f64))
                }
            })
            .collect();
        Ok(sort_and_truncate(hits, k))
    }

    async fn ilike_topk(&self, tokens: &[String], k: usize, agent_id: &str, namespace: &str) -> Result<Vec<Hit>> {
        let inner = self.inner.lock().unwrap();
        let hits = Self::visible(&inner, agent_id, namespace)
            .into_iter()
            .filter_map(|c| {
                let text = c.text.to_lowercase();
                let matched = tokens.iter().any(|t| text.contains(&t.to_lowercase()));
                matched.then(|| hit_from(c, 1.0))
            })
            .collect();
        Ok(sort_and_truncate(hits, k))
    }

    async fn trigram_topk(&self, query: &str, k: usize, agent_id: &str, namespace: &str) -> Result<Vec<Hit>> {
        self.ilike_topk(&[query.to_string()], k, agent_id, namespace).await
    }

    async fn list_agents(&self, namespace: &str) -> Result<Vec<Agent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.agents.values().filter(|a| a.namespace == namespace).cloned().collect())
    }

    async fn get_agent(&self, id: &str) -> Result<Agent> {
        let inner = self.inner.lock().unwrap();
        inner.agents.get(id).cloned().ok_or_else(|| GasableError::NotFound(format!("agent {id}")))
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        self.inner.lock().unwrap().agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        Ok(self.inner.lock().unwrap().tools.values().cloned().collect())
    }

    async fn get_tool(&self, name: &str) -> Result<ToolSpec> {
        self.inner
            .lock()
            .unwrap()
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| GasableError::NotFound(format!("tool {name}")))
    }

    async fn upsert_tool(&self, tool: &ToolSpec) -> Result<()> {
        self.inner.lock().unwrap().tools.insert(tool.name.clone(), tool.clone());
        Ok(())
    }

    async fn list_workflows(&self, namespace: &str) -> Result<Vec<Workflow>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .workflows
            .values()
            .filter(|w| w.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.inner
            .lock()
            .unwrap()
            .workflows
            .get(id)
            .cloned()
            .ok_or_else(|| GasableError::NotFound(format!("workflow {id}")))
    }

    async fn upsert_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.inner.lock().unwrap().workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn append_run(&self, run: &RunRecord) -> Result<()> {
        self.inner.lock().unwrap().runs.push(run.clone());
        Ok(())
    }

    async fn record_error(&self, kind: ErrorKind, message: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.errors.push(ErrorEvent {
            ts: chrono::Utc::now(),
            kind,
            message: message.to_string(),
        });
        if inner.errors.len() > 100 {
            let excess = inner.errors.len() - 100;
            inner.errors.drain(0..excess);
        }
        Ok(())
    }

    async fn recent_errors(&self, n: usize) -> Result<Vec<ErrorEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.errors.iter().rev().take(n).cloned().collect())
    }

    async fn put_secret(&self, secret: &Secret) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .secrets
            .entry((secret.scope.clone(), secret.key_name.clone()))
            .or_default()
            .push(secret.clone());
        Ok(())
    }

    async fn get_secret_latest(&self, scope: &str, key_name: &str) -> Result<Secret> {
        let inner = self.inner.lock().unwrap();
        inner
            .secrets
            .get(&(scope.to_string(), key_name.to_string()))
            .and_then(|versions| versions.iter().max_by_key(|s| s.version))
            .cloned()
            .ok_or_else(|| GasableError::NotFound(format!("secret not found: {scope}/{key_name}")))
    }

    async fn get_secret_version(&self, scope: &str, key_name: &str, version: i32) -> Result<Secret> {
        let inner = self.inner.lock().unwrap();
        inner
            .secrets
            .get(&(scope.to_string(), key_name.to_string()))
            .and_then(|versions| versions.iter().find(|s| s.version == version))
            .cloned()
            .ok_or_else(|| GasableError::NotFound(format!("secret version not found: {scope}/{key_name}@{version}")))
    }

    async fn list_secrets(&self, scope: &str) -> Result<Vec<Secret>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .secrets
            .iter()
            .filter(|((s, _), _)| s == scope)
            .filter_map(|(_, versions)| versions.iter().max_by_key(|s| s.version).cloned())
            .collect())
    }

    async fn prune_secret_versions(&self, scope: &str, key_name: &str, keep_from_version: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(versions) = inner.secrets.get_mut(&(scope.to_string(), key_name.to_string())) {
            versions.retain(|s| s.version >= keep_from_version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn namespace_isolation() {
        let store = MemStore::new();
        let mut a = Chunk::new("a", "hello world");
        a.namespace = "ns-a".to_string();
        let mut b = Chunk::new("b", "hello world");
        b.namespace = "ns-b".to_string();
        store.upsert_chunks(&[a, b]).await.unwrap();

        let hits = store.bm25_topk("hello", 10, "default", "ns-a").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "a");
    }

    #[tokio::test]
    async fn agent_isolation() {
        let store = MemStore::new();
        let mut owned = Chunk::new("owned", "secret plan");
        owned.agent_id = "research".to_string();
        let mut other = Chunk::new("other", "secret plan");
        other.agent_id = "marketing".to_string();
        let mut shared = Chunk::new("shared", "secret plan");
        shared.agent_id = "default".to_string();
        store.upsert_chunks(&[owned, other, shared]).await.unwrap();

        let hits = store.bm25_topk("secret", 10, "research", "global").await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.node_id.as_str()).collect();
        assert!(ids.contains(&"owned"));
        assert!(ids.contains(&"shared"));
        assert!(!ids.contains(&"other"));
    }
}
