//! C3: hybrid retrieval (spec §4.3). Dense vector search + lexical ILIKE +
//! optional keyword prefilter + optional BM25, fused with Reciprocal Rank
//! Fusion, boosted, filtered, optionally LLM-reranked, and diversified with
//! MMR. A soft wall-clock budget degrades to a pure-lexical fallback rather
//! than erroring.

mod boost;
mod expand;
mod fuse;
mod language;
mod mmr;

pub use language::{detect_language, Language};
pub use boost::tokenize as tokenize_for_matching;

use crate::error::Result;
use crate::llm::{ChatClient, Embedder};
use crate::store::{Hit, Store};
use config::RagSettings;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Curated bilingual vocabulary that triggers the keyword prefilter step
/// (spec §4.3 step 5).
const KEYWORD_VOCAB: &[&str] = &[
    "contract", "supplier", "rfq", "tender", "diesel", "invoice", "procurement",
    "عقد", "مورد", "مناقصة", "ديزل", "فاتورة",
];

/// SSE step emitter, grounded on the teacher's `ToolStreamWriter` (a
/// boxed emit closure handed down through a call context) rather than a
/// concrete transport — the HTTP layer supplies the real SSE writer, tests
/// supply [`NoopReporter`] or a recording double.
pub trait StepReporter: Send + Sync {
    fn emit(&self, step: &str, data: Value);
}

pub struct NoopReporter;

impl StepReporter for NoopReporter {
    fn emit(&self, _step: &str, _data: Value) {}
}

/// Adapts an arbitrary `Fn(Value) -> bool` sink (e.g. an SSE channel send)
/// into a [`StepReporter`], mirroring `loom::stream::ToolStreamWriter`.
pub struct ChannelReporter {
    emit_fn: Arc<dyn Fn(Value) -> bool + Send + Sync>,
}

impl ChannelReporter {
    pub fn new(emit_fn: Arc<dyn Fn(Value) -> bool + Send + Sync>) -> Self {
        Self { emit_fn }
    }
}

impl StepReporter for ChannelReporter {
    fn emit(&self, step: &str, data: Value) {
        (self.emit_fn)(json!({ "step": step, "data": data }));
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Selected {
    pub id: String,
    pub score: f64,
    pub text: String,
    pub metadata: Value,
    pub order: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrieveResult {
    pub expansions: Vec<String>,
    pub selected: Vec<Selected>,
    pub fused: Vec<FusedCandidate>,
    pub budget_hit: bool,
    pub elapsed_ms: u64,
    pub language: Language,
}

fn budget_exceeded(start: Instant, budget: Duration) -> bool {
    start.elapsed() >= budget
}

fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .take(6)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

fn record_hits(
    hits: Vec<Hit>,
    ids: &mut Vec<String>,
    text_by_id: &mut HashMap<String, String>,
    metadata_by_id: &mut HashMap<String, Value>,
) {
    for hit in hits {
        ids.push(hit.node_id.clone());
        text_by_id.entry(hit.node_id.clone()).or_insert(hit.text);
        metadata_by_id.entry(hit.node_id).or_insert(hit.metadata);
    }
}

/// Public entry point — spec §4.3's `retrieve(query, agent_id, namespace,
/// cfg) -> {expansions[], selected[], fused[], budget_hit, elapsed_ms}`.
#[allow(clippy::too_many_arguments)]
pub async fn retrieve(
    store: &dyn Store,
    embedder: &dyn Embedder,
    chat: Option<&dyn ChatClient>,
    embed_model: &str,
    rerank_model: &str,
    query: &str,
    agent_id: &str,
    namespace: &str,
    cfg: RagSettings,
    prefer_domain_boost: Option<&str>,
    reporter: &dyn StepReporter,
) -> Result<RetrieveResult> {
    let start = Instant::now();
    let budget = Duration::from_millis(cfg.budget_ms);
    let language = detect_language(query);
    reporter.emit("received_query", json!({ "query": query, "language": language }));

    let expansions = expand_query(chat, embed_model, query, cfg, start, budget).await;
    reporter.emit("expansions", json!({ "expansions": expansions }));

    let mut text_by_id: HashMap<String, String> = HashMap::new();
    let mut metadata_by_id: HashMap<String, Value> = HashMap::new();
    let mut lists: Vec<Vec<String>> = Vec::new();

    // Step 3: dense retrieval, one sub-task per expansion, run concurrently
    // (spec §5: "Expansion sub-tasks run in parallel").
    let mut dense_count = 0usize;
    if !budget_exceeded(start, budget) {
        let dense_futures = expansions.iter().map(|expansion| async move {
            match embedder.embed(embed_model, &[expansion.clone()]).await {
                Ok(mut vectors) => {
                    let vector = vectors.pop().unwrap_or_default();
                    match store.vector_topk(&vector, cfg.k_dense_each, agent_id, namespace).await {
                        Ok(hits) => hits,
                        Err(e) => {
                            tracing::warn!(error = %e, "dense retrieval sub-step failed, continuing");
                            Vec::new()
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "embed sub-step failed, continuing");
                    Vec::new()
                }
            }
        });
        for hits in futures::future::join_all(dense_futures).await {
            dense_count += hits.len();
            let mut ids = Vec::new();
            record_hits(hits, &mut ids, &mut text_by_id, &mut metadata_by_id);
            lists.push(ids);
        }
    }
    reporter.emit("dense_retrieval", json!({ "hits": dense_count }));

    // Step 4: lexical retrieval, one sub-task per expansion, run concurrently.
    let mut lex_count = 0usize;
    if !budget_exceeded(start, budget) {
        let lex_futures = expansions.iter().map(|expansion| async move {
            let tokens = tokenize_query(expansion);
            if tokens.is_empty() {
                return Vec::new();
            }
            match store.ilike_topk(&tokens, cfg.k_lex, agent_id, namespace).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(error = %e, "lexical retrieval sub-step failed, continuing");
                    Vec::new()
                }
            }
        });
        for hits in futures::future::join_all(lex_futures).await {
            lex_count += hits.len();
            let mut ids = Vec::new();
            record_hits(hits, &mut ids, &mut text_by_id, &mut metadata_by_id);
            lists.push(ids);
        }
    }
    reporter.emit("lex_retrieval", json!({ "hits": lex_count }));

    // Step 5: keyword prefilter.
    let mut keyword_matched = false;
    if cfg.keyword_prefilter && !budget_exceeded(start, budget) {
        let normalized = query.to_ascii_lowercase();
        let matched_terms: Vec<&str> = KEYWORD_VOCAB
            .iter()
            .filter(|term| normalized.contains(*term))
            .copied()
            .collect();
        if !matched_terms.is_empty() {
            keyword_matched = true;
            let tokens: Vec<String> = matched_terms.iter().map(|t| t.to_string()).collect();
            match store.ilike_topk(&tokens, cfg.k_lex, agent_id, namespace).await {
                Ok(hits) => {
                    let mut ids = Vec::new();
                    record_hits(hits, &mut ids, &mut text_by_id, &mut metadata_by_id);
                    lists.push(ids);
                }
                Err(e) => tracing::warn!(error = %e, "keyword prefilter sub-step failed, continuing"),
            }
        }
    }
    reporter.emit("keyword_prefilter", json!({ "matched": keyword_matched }));

    // Step 6: BM25.
    if cfg.use_bm25 && !budget_exceeded(start, budget) {
        match store.bm25_topk(query, cfg.k_lex, agent_id, namespace).await {
            Ok(hits) => {
                let mut ids = Vec::new();
                record_hits(hits, &mut ids, &mut text_by_id, &mut metadata_by_id);
                lists.push(ids);
            }
            Err(e) => tracing::warn!(error = %e, "bm25 sub-step failed, continuing"),
        }
    }
    reporter.emit("bm25", json!({ "enabled": cfg.use_bm25 }));

    // Step 7: fuse + cap.
    let mut fused = fuse::rrf_fuse(&lists);
    fused.truncate(cfg.k_dense_fuse);
    reporter.emit("fusion", json!({ "candidates": fused.len() }));

    if budget_exceeded(start, budget) || fused.is_empty() {
        return timeout_fallback(
            store,
            query,
            agent_id,
            namespace,
            &cfg,
            prefer_domain_boost,
            language,
            expansions,
            start,
            reporter,
        )
        .await;
    }

    // Step 8: boosts.
    let boosted = boost::apply_boosts(fused, query, &text_by_id, prefer_domain_boost);

    // Step 9: candidate filter.
    let filtered = boost::candidate_filter(boosted, query, &text_by_id, cfg.final_k);

    // Step 10: optional LLM rerank.
    let reranked = if cfg.llm_rerank && !budget_exceeded(start, budget) {
        if let Some(chat) = chat {
            match llm_rerank(chat, rerank_model, query, &filtered, &text_by_id).await {
                Some(order) => order,
                None => filtered,
            }
        } else {
            filtered
        }
    } else {
        filtered
    };

    // Step 11: MMR selection.
    let order = mmr::mmr_select(&reranked, &text_by_id, cfg.mmr_lambda, cfg.final_k);
    reporter.emit("retrieval_done", json!({ "selected": order.len() }));

    // Step 12: backfill missing text.
    let missing: Vec<String> = order.iter().filter(|id| !text_by_id.contains_key(*id)).cloned().collect();
    if !missing.is_empty() {
        if let Ok(chunks) = store.fetch_by_ids(&missing).await {
            for chunk in chunks {
                text_by_id.insert(chunk.node_id.clone(), chunk.text);
                metadata_by_id.entry(chunk.node_id).or_insert(chunk.metadata);
            }
        }
    }

    let score_by_id: HashMap<String, f64> = reranked.iter().cloned().collect();
    let selected: Vec<Selected> = order
        .into_iter()
        .enumerate()
        .map(|(idx, id)| Selected {
            score: *score_by_id.get(&id).unwrap_or(&0.0),
            text: text_by_id.get(&id).cloned().unwrap_or_default(),
            metadata: metadata_by_id.get(&id).cloned().unwrap_or(Value::Null),
            order: idx,
            id,
        })
        .collect();

    let fused_out: Vec<FusedCandidate> = reranked.into_iter().map(|(id, score)| FusedCandidate { id, score }).collect();

    Ok(RetrieveResult {
        expansions,
        selected,
        fused: fused_out,
        budget_hit: false,
        elapsed_ms: start.elapsed().as_millis() as u64,
        language,
    })
}

async fn expand_query(
    chat: Option<&dyn ChatClient>,
    model: &str,
    query: &str,
    cfg: RagSettings,
    start: Instant,
    budget: Duration,
) -> Vec<String> {
    if let Some(chat) = chat {
        if !budget_exceeded(start, budget) {
            if let Some(rewrites) = expand::llm_expand(chat, model, query, cfg.expansions.saturating_sub(1)).await {
                let mut all = vec![query.to_string()];
                all.extend(rewrites);
                all.truncate(cfg.expansions.max(1));
                return all;
            }
        }
    }
    expand::deterministic_expand(query, cfg.expansions.max(1))
}

async fn llm_rerank(
    chat: &dyn ChatClient,
    model: &str,
    query: &str,
    candidates: &[(String, f64)],
    text_by_id: &HashMap<String, String>,
) -> Option<Vec<(String, f64)>> {
    use crate::llm::ChatMessage;

    let listing: Vec<Value> = candidates
        .iter()
        .enumerate()
        .map(|(idx, (id, _))| {
            let text = text_by_id.get(id).map(|s| s.as_str()).unwrap_or_default();
            json!({ "index": idx, "id": id, "text": text.chars().take(400).collect::<String>() })
        })
        .collect();
    let prompt = format!(
        "Query: {query}\n\nScore each candidate's relevance to the query from 0.0 to 1.0. \
         Respond with ONLY a JSON array of {{\"index\": int, \"score\": float}}, no prose.\n\n\
         Candidates: {}",
        Value::Array(listing)
    );

    let reply = chat.chat(model, vec![ChatMessage::User(prompt)], None).await.ok()?;
    let content = reply.content?;

    #[derive(serde::Deserialize)]
    struct RerankEntry {
        index: usize,
        score: f64,
    }
    let scores: Vec<RerankEntry> = serde_json::from_str(content.trim()).ok()?;
    if scores.is_empty() {
        return None;
    }

    let mut reordered: Vec<(String, f64)> = scores
        .into_iter()
        .filter_map(|entry| candidates.get(entry.index).map(|(id, _)| (id.clone(), entry.score)))
        .collect();
    reordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    if reordered.is_empty() {
        None
    } else {
        Some(reordered)
    }
}

/// Failure semantics (spec §4.3): a budget-exceeded or empty-fusion result
/// jumps straight to a pure lexical top-K — preferred domain first, then
/// unfiltered, then trigram similarity as a last resort.
#[allow(clippy::too_many_arguments)]
async fn timeout_fallback(
    store: &dyn Store,
    query: &str,
    agent_id: &str,
    namespace: &str,
    cfg: &RagSettings,
    prefer_domain_boost: Option<&str>,
    language: Language,
    expansions: Vec<String>,
    start: Instant,
    reporter: &dyn StepReporter,
) -> Result<RetrieveResult> {
    reporter.emit("timeout_fallback", json!({}));

    let tokens = tokenize_query(query);
    let mut hits = if !tokens.is_empty() {
        store.ilike_topk(&tokens, cfg.final_k * 2, agent_id, namespace).await.unwrap_or_default()
    } else {
        Vec::new()
    };
    if hits.is_empty() {
        hits = store.trigram_topk(query, cfg.final_k * 2, agent_id, namespace).await.unwrap_or_default();
    }

    if let Some(prefix) = prefer_domain_boost {
        hits.sort_by(|a, b| {
            let a_pref = a.node_id.starts_with(prefix);
            let b_pref = b.node_id.starts_with(prefix);
            b_pref.cmp(&a_pref).then_with(|| b.score.partial_cmp(&a.score).unwrap())
        });
    }

    hits.truncate(cfg.final_k);
    let fused: Vec<FusedCandidate> = hits
        .iter()
        .map(|h| FusedCandidate { id: h.node_id.clone(), score: h.score })
        .collect();
    let selected: Vec<Selected> = hits
        .into_iter()
        .enumerate()
        .map(|(idx, h)| Selected {
            id: h.node_id,
            score: h.score,
            text: h.text,
            metadata: h.metadata,
            order: idx,
        })
        .collect();

    Ok(RetrieveResult {
        expansions,
        selected,
        fused,
        budget_hit: true,
        elapsed_ms: start.elapsed().as_millis() as u64,
        language,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatReply, ToolDef};
    use crate::model::Chunk;
    use crate::store::MemStore;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[allow(dead_code)]
    struct NoChat;
    #[async_trait]
    impl ChatClient for NoChat {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: Option<Vec<ToolDef>>) -> Result<ChatReply> {
            unreachable!("tests never enable llm paths without configuring a real fake")
        }
    }

    async fn seeded_store() -> MemStore {
        let store = MemStore::new();
        store
            .upsert_chunks(&[
                Chunk {
                    node_id: "doc://a".into(),
                    text: "diesel delivery schedule for fleets".into(),
                    embedding: Some(vec![1.0, 1.0]),
                    agent_id: "default".into(),
                    namespace: "global".into(),
                    chunk_index: 0,
                    metadata: Value::Null,
                },
                Chunk {
                    node_id: "doc://b".into(),
                    text: "ev charging network OCPP type 2 connectors".into(),
                    embedding: Some(vec![2.0, 1.0]),
                    agent_id: "default".into(),
                    namespace: "global".into(),
                    chunk_index: 0,
                    metadata: Value::Null,
                },
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn retrieval_happy_path_returns_selected_hits() {
        let store = seeded_store().await;
        let embedder = FakeEmbedder;
        let cfg = RagSettings { llm_rerank: false, ..RagSettings::default() };
        let result = retrieve(
            &store,
            &embedder,
            None,
            "embed-model",
            "rerank-model",
            "diesel delivery",
            "default",
            "global",
            cfg,
            None,
            &NoopReporter,
        )
        .await
        .unwrap();
        assert!(!result.selected.is_empty());
        assert!(!result.budget_hit);
        assert_eq!(result.selected[0].order, 0);
    }

    #[tokio::test]
    async fn zero_hit_query_returns_empty_selected() {
        let store = MemStore::new();
        let embedder = FakeEmbedder;
        let cfg = RagSettings::default();
        let result = retrieve(
            &store,
            &embedder,
            None,
            "embed-model",
            "rerank-model",
            "anything",
            "default",
            "global",
            cfg,
            None,
            &NoopReporter,
        )
        .await
        .unwrap();
        assert!(result.selected.is_empty());
    }

    #[tokio::test]
    async fn zero_budget_jumps_straight_to_timeout_fallback() {
        let store = seeded_store().await;
        let embedder = FakeEmbedder;
        let cfg = RagSettings { budget_ms: 0, ..RagSettings::default() };
        let result = retrieve(
            &store,
            &embedder,
            None,
            "embed-model",
            "rerank-model",
            "diesel delivery",
            "default",
            "global",
            cfg,
            None,
            &NoopReporter,
        )
        .await
        .unwrap();
        assert!(result.budget_hit);
    }
}
