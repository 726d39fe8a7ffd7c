//! C6: agent orchestrator (spec §4.6). Routes a message to an agent, then
//! runs a ReAct-style think/act loop against the Tool Registry — grounded
//! on the teacher's `agent::react` module (`ThinkNode` calls the model,
//! `ActNode` dispatches tool calls, `tools_condition` ends the run once a
//! reply carries no tool calls) collapsed into a single async loop since
//! this system has no separate graph-execution engine to host nodes in.

mod routing;

pub use routing::{route_intent, DEFAULT_AGENT};

use crate::error::{ErrorKind, Result};
use crate::llm::{ChatClient, ChatMessage, ToolCall, ToolDef};
use crate::model::{Agent, RunRecord, ToolCallRecord};
use crate::retriever::StepReporter;
use crate::store::Store;
use crate::tools::{ToolRegistry, ToolResult};
use crate::vault::Vault;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_MAX_TOOL_CALLS: usize = 8;
const DEFAULT_BUDGET_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct OrchestrateRequest {
    pub user_id: String,
    pub message: String,
    pub namespace: String,
    pub agent_preference: Option<String>,
    pub max_tool_calls: usize,
    pub budget_ms: u64,
}

impl OrchestrateRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
            namespace: namespace.into(),
            agent_preference: None,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            budget_ms: DEFAULT_BUDGET_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrateResult {
    pub agent: String,
    pub message: String,
    pub status: &'static str,
    pub error_kind: Option<ErrorKind>,
}

/// Resolves `request.agent_preference` to a known agent id, otherwise
/// falls back to rule-based routing (spec §4.6 "Intent routing").
async fn select_agent(store: &dyn Store, request: &OrchestrateRequest) -> Result<Agent> {
    if let Some(preference) = &request.agent_preference {
        if let Ok(agent) = store.get_agent(preference).await {
            return Ok(agent);
        }
    }
    let agent_id = route_intent(&request.message);
    store.get_agent(agent_id).await
}

fn tool_defs_for(registry: &ToolRegistry, agent: &Agent) -> Vec<ToolDef> {
    registry
        .list()
        .into_iter()
        .filter(|spec| agent.allows_tool(&spec.name))
        .map(|spec| ToolDef { name: spec.name, description: spec.description, parameters: spec.input_schema })
        .collect()
}

fn budget_exceeded(start: Instant, budget: Duration) -> bool {
    start.elapsed() >= budget
}

/// Runs one tool call: resolves credentials, dispatches through the
/// Registry's allow-list + credential gate, and reports the outcome. The
/// `Err` case covers only conditions the Orchestrator must abort the whole
/// run on (`Forbidden`, `MissingCredential`, `NotFound` — spec §7
/// propagation policy); a tool that runs and returns `{status:"error"}` is
/// not one of those and simply flows back into the conversation.
async fn dispatch_tool_call(
    registry: &ToolRegistry,
    vault: &Vault,
    agent: &Agent,
    call: &ToolCall,
    user_id: &str,
    reporter: &dyn StepReporter,
) -> Result<ToolResult> {
    reporter.emit("tool_call_started", json!({ "name": call.name, "args": call.arguments }));

    let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
    let required_keys = registry.get(&call.name).map(|t| t.spec().required_keys.clone()).unwrap_or_default();
    let credentials = vault.resolve_credentials(&required_keys, &agent.id, Some(user_id)).await;
    let allowed = Some(&agent.tool_allowlist);

    let result = registry.invoke(&call.name, args, allowed, &credentials, None, Some(user_id.to_string())).await;

    match &result {
        Ok(tool_result) => {
            reporter.emit(
                "tool_call_finished",
                json!({ "name": call.name, "status": if tool_result.is_ok() { "ok" } else { "error" } }),
            );
        }
        Err(e) => {
            reporter.emit("tool_call_finished", json!({ "name": call.name, "error_kind": e.kind() }));
        }
    }
    result
}

/// Spec §4.6's assistant run loop. Terminates on model completion, the
/// tool-call ceiling, the time budget, or an unrecoverable tool error
/// (`Forbidden`/`MissingCredential`/`NotFound`, which abort immediately).
pub async fn orchestrate(
    store: &dyn Store,
    chat: &dyn ChatClient,
    registry: &ToolRegistry,
    vault: &Vault,
    model: &str,
    request: &OrchestrateRequest,
    reporter: &dyn StepReporter,
) -> Result<OrchestrateResult> {
    let start = Instant::now();
    let budget = Duration::from_millis(request.budget_ms);

    let agent = select_agent(store, request).await?;
    reporter.emit("routed_to", json!({ "agent": agent.id }));

    let tools = tool_defs_for(registry, &agent);
    let mut messages = vec![ChatMessage::System(agent.system_prompt.clone()), ChatMessage::User(request.message.clone())];
    let mut tool_calls_made = 0usize;
    let mut tool_call_records: Vec<ToolCallRecord> = Vec::new();

    loop {
        if budget_exceeded(start, budget) {
            let final_text = "Run terminated: time budget exceeded.".to_string();
            return Ok(finish(store, &agent, request, start, tool_call_records, final_text, None).await);
        }

        let reply = chat.chat(model, messages.clone(), Some(tools.clone())).await?;

        let Some(calls) = reply.tool_calls.clone().filter(|c| !c.is_empty()) else {
            let final_text = reply.content.unwrap_or_default();
            return Ok(finish(store, &agent, request, start, tool_call_records, final_text, None).await);
        };

        messages.push(ChatMessage::Assistant { content: reply.content.clone(), tool_calls: Some(calls.clone()) });

        for call in &calls {
            if tool_calls_made >= request.max_tool_calls {
                let final_text = "Run terminated: tool-call ceiling reached.".to_string();
                return Ok(finish(store, &agent, request, start, tool_call_records, final_text, None).await);
            }

            let outcome = dispatch_tool_call(registry, vault, &agent, call, &request.user_id, reporter).await;
            tool_calls_made += 1;

            match outcome {
                Ok(tool_result) => {
                    let content = serde_json::to_string(&tool_result).unwrap_or_default();
                    let is_ok = tool_result.is_ok();
                    tool_call_records.push(ToolCallRecord {
                        tool_name: call.name.clone(),
                        args: serde_json::from_str(&call.arguments).unwrap_or(Value::Null),
                        status: if is_ok { "ok" } else { "error" }.to_string(),
                        error_kind: None,
                    });
                    messages.push(ChatMessage::Tool { tool_call_id: call.id.clone(), content });
                }
                Err(e) => {
                    let kind = e.kind();
                    tool_call_records.push(ToolCallRecord {
                        tool_name: call.name.clone(),
                        args: serde_json::from_str(&call.arguments).unwrap_or(Value::Null),
                        status: "error".to_string(),
                        error_kind: Some(format!("{kind:?}")),
                    });
                    let final_text = e.to_string();
                    return Ok(finish(store, &agent, request, start, tool_call_records, final_text, Some(kind)).await);
                }
            }

            if budget_exceeded(start, budget) {
                break;
            }
        }
    }
}

async fn finish(
    store: &dyn Store,
    agent: &Agent,
    request: &OrchestrateRequest,
    start: Instant,
    tool_calls: Vec<ToolCallRecord>,
    message: String,
    error_kind: Option<ErrorKind>,
) -> OrchestrateResult {
    let run = RunRecord {
        run_id: uuid::Uuid::new_v4().to_string(),
        user_id: request.user_id.clone(),
        namespace: request.namespace.clone(),
        selected_agent: agent.id.clone(),
        user_message: request.message.clone(),
        tool_calls,
        result_summary: message.clone(),
        elapsed_ms: start.elapsed().as_millis() as u64,
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = store.append_run(&run).await {
        tracing::warn!(error = %e, "failed to persist run record");
    }

    OrchestrateResult {
        agent: agent.id.clone(),
        message,
        status: if error_kind.is_some() { "error" } else { "ok" },
        error_kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatReply;
    use crate::model::ToolSpec;
    use crate::retriever::NoopReporter;
    use crate::store::MemStore;
    use crate::tools::{Tool, ToolContext};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn agent(id: &str, allowlist: &[&str]) -> Agent {
        Agent {
            id: id.to_string(),
            display_name: id.to_string(),
            namespace: "global".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            tool_allowlist: allowlist.iter().map(|s| s.to_string()).collect(),
            answer_model: "gpt-4o-mini".to_string(),
            rerank_model: "gpt-4o-mini".to_string(),
            top_k: 6,
            assistant_id: None,
            api_key: None,
            rag_settings: Default::default(),
        }
    }

    async fn seeded_store(agents: Vec<Agent>) -> MemStore {
        let store = MemStore::default();
        for a in agents {
            store.upsert_agent(&a).await.unwrap();
        }
        store
    }

    struct EchoTool(ToolSpec);

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> &ToolSpec {
            &self.0
        }
        async fn invoke(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::ok(args)
        }
    }

    struct FinalAnswerClient(String);

    #[async_trait]
    impl ChatClient for FinalAnswerClient {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: Option<Vec<ToolDef>>) -> Result<ChatReply> {
            Ok(ChatReply { content: Some(self.0.clone()), tool_calls: None })
        }
    }

    /// Emits one `orders.place` tool call on the first turn, then a final answer.
    struct OneToolThenDoneClient {
        turn: AtomicUsize,
    }

    #[async_trait]
    impl ChatClient for OneToolThenDoneClient {
        async fn chat(&self, _m: &str, _msgs: Vec<ChatMessage>, _t: Option<Vec<ToolDef>>) -> Result<ChatReply> {
            let turn = self.turn.fetch_add(1, Ordering::SeqCst);
            if turn == 0 {
                Ok(ChatReply {
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "orders.place".to_string(),
                        arguments: "{\"sku\":\"abc\"}".to_string(),
                    }]),
                })
            } else {
                Ok(ChatReply { content: Some("Order placed.".to_string()), tool_calls: None })
            }
        }
    }

    #[tokio::test]
    async fn support_agent_with_no_tools_returns_model_reply_directly() {
        let store = seeded_store(vec![agent("support", &[])]).await;
        let chat = FinalAnswerClient("Hi, how can I help?".to_string());
        let registry = ToolRegistry::new();
        let vault = Vault::new(Arc::new(MemStore::default()), [1u8; 32]);
        let request = OrchestrateRequest::new("u1", "hello", "global");

        let result = orchestrate(&store, &chat, &registry, &vault, "m", &request, &NoopReporter).await.unwrap();
        assert_eq!(result.agent, "support");
        assert_eq!(result.status, "ok");
        assert_eq!(result.message, "Hi, how can I help?");
    }

    #[tokio::test]
    async fn marketing_keywords_route_to_marketing_agent() {
        let store = seeded_store(vec![agent("support", &[]), agent("marketing", &[])]).await;
        let chat = FinalAnswerClient("Draft sent.".to_string());
        let registry = ToolRegistry::new();
        let vault = Vault::new(Arc::new(MemStore::default()), [1u8; 32]);
        let request = OrchestrateRequest::new("u1", "Please draft an email for our diesel promo", "global");

        let result = orchestrate(&store, &chat, &registry, &vault, "m", &request, &NoopReporter).await.unwrap();
        assert_eq!(result.agent, "marketing");
    }

    #[tokio::test]
    async fn allowed_tool_call_dispatches_and_run_completes() {
        let store = seeded_store(vec![agent("procurement", &["orders.place"])]).await;
        let chat = OneToolThenDoneClient { turn: AtomicUsize::new(0) };
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("orders.place", "places an order"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [1u8; 32]);
        let mut request = OrchestrateRequest::new("u1", "place an order", "global");
        request.agent_preference = Some("procurement".to_string());

        let result = orchestrate(&store, &chat, &registry, &vault, "m", &request, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        assert_eq!(result.message, "Order placed.");
    }

    #[tokio::test]
    async fn tool_call_outside_allow_list_aborts_run_as_forbidden() {
        let store = seeded_store(vec![agent("support", &[])]).await;
        let chat = OneToolThenDoneClient { turn: AtomicUsize::new(0) };
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("orders.place", "places an order"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [1u8; 32]);
        let request = OrchestrateRequest::new("u1", "hello", "global");

        let result = orchestrate(&store, &chat, &registry, &vault, "m", &request, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "error");
        assert_eq!(result.error_kind, Some(ErrorKind::Forbidden));
    }

    #[tokio::test]
    async fn missing_credential_aborts_run_before_dispatch() {
        let store = seeded_store(vec![agent("procurement", &["orders.place"])]).await;
        let chat = OneToolThenDoneClient { turn: AtomicUsize::new(0) };
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(
            ToolSpec::new("orders.place", "places an order").with_required_keys(vec!["ORDERS_API_KEY".to_string()]),
        )));
        let vault = Vault::new(Arc::new(MemStore::default()), [1u8; 32]);
        let mut request = OrchestrateRequest::new("u1", "place an order", "global");
        request.agent_preference = Some("procurement".to_string());

        let result = orchestrate(&store, &chat, &registry, &vault, "m", &request, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "error");
        assert_eq!(result.error_kind, Some(ErrorKind::MissingCredential));
    }

    #[tokio::test]
    async fn run_record_is_persisted_after_completion() {
        let store = seeded_store(vec![agent("support", &[])]).await;
        let chat = FinalAnswerClient("done".to_string());
        let registry = ToolRegistry::new();
        let vault = Vault::new(Arc::new(MemStore::default()), [1u8; 32]);
        let request = OrchestrateRequest::new("u1", "hello", "global");

        orchestrate(&store, &chat, &registry, &vault, "m", &request, &NoopReporter).await.unwrap();
        let errors = store.recent_errors(10).await.unwrap();
        assert!(errors.is_empty());
    }

    #[test]
    fn allowed_tools_filter_includes_only_allowlisted_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("a", "a"))));
        registry.register(Arc::new(EchoTool(ToolSpec::new("b", "b"))));
        let a = agent("x", &["a"]);
        let defs = tool_defs_for(&registry, &a);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "a");
    }
}
