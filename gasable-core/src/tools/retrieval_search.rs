//! Built-in `retrieval.search` tool: wraps C3's [`crate::retriever::retrieve`]
//! so the orchestrator's think/act loop can call retrieval like any other
//! tool instead of hard-wiring the retriever into the agent step.

use super::{Tool, ToolContext, ToolResult};
use crate::llm::{ChatClient, Embedder};
use crate::model::{ToolSpec, DEFAULT_AGENT_ID};
use crate::retriever::{self, NoopReporter};
use crate::store::Store;
use async_trait::async_trait;
use config::RagSettings;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct RetrievalSearchTool {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    chat: Option<Arc<dyn ChatClient>>,
    embed_model: String,
    rerank_model: String,
    prefer_domain_boost: Option<String>,
    spec: ToolSpec,
}

impl RetrievalSearchTool {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        chat: Option<Arc<dyn ChatClient>>,
        embed_model: String,
        rerank_model: String,
        prefer_domain_boost: Option<String>,
    ) -> Self {
        let spec = ToolSpec::new("retrieval.search", "Searches the knowledge base for relevant context")
            .with_required_keys(vec![]);
        Self { store, embedder, chat, embed_model, rerank_model, prefer_domain_boost, spec }
    }
}

#[async_trait]
impl Tool for RetrievalSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolResult::error("missing required field: query");
        };
        let agent_id = args.get("agent_id").and_then(Value::as_str).unwrap_or(DEFAULT_AGENT_ID);
        let namespace = args.get("namespace").and_then(Value::as_str).unwrap_or("global");

        let result = retriever::retrieve(
            self.store.as_ref(),
            self.embedder.as_ref(),
            self.chat.as_deref(),
            &self.embed_model,
            &self.rerank_model,
            query,
            agent_id,
            namespace,
            RagSettings::default(),
            self.prefer_domain_boost.as_deref(),
            &NoopReporter,
        )
        .await;

        match result {
            Ok(result) => ToolResult::ok(json!({ "hits": result.selected, "expansions": result.expansions })),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
