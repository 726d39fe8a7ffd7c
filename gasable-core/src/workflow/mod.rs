//! C7: workflow runtime (spec §4.7). Generalizes the teacher's
//! `graph::state_graph::StateGraph` — a compile-time, code-defined node
//! chain compiled once at startup — into a runtime-loaded JSON graph:
//! nodes are normalized, credentials are gated up front across every
//! reachable tool/agent node, then the graph executes in topological
//! order with mapper nodes picking which branch gets visited.
//! `petgraph` does the topological ordering the teacher's
//! `StateGraph::compile` hand-rolls for its static graphs.

mod condition;
mod normalize;

pub use normalize::normalize_kind;

use crate::error::{ErrorKind, GasableError, Result};
use crate::model::{EdgeCondition, Workflow, WorkflowNode, WorkflowNodeKind};
use crate::retriever::StepReporter;
use crate::tools::ToolRegistry;
use crate::vault::Vault;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct NodeExecutionRecord {
    pub node_id: String,
    pub status: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub status: &'static str,
    pub error_kind: Option<ErrorKind>,
    pub required_keys: Vec<String>,
    pub outputs: HashMap<String, Value>,
    pub node_results: Vec<NodeExecutionRecord>,
}

impl WorkflowResult {
    fn missing_credentials(required_keys: Vec<String>) -> Self {
        Self {
            status: "error",
            error_kind: Some(ErrorKind::MissingCredential),
            required_keys,
            outputs: HashMap::new(),
            node_results: Vec::new(),
        }
    }
}

fn tool_or_agent(kind: WorkflowNodeKind) -> bool {
    matches!(kind, WorkflowNodeKind::Tool | WorkflowNodeKind::Agent)
}

/// Substitutes `"{{<node_id>.output}}"` string leaves with that node's
/// recorded output (spec §4.7 step 5: "output of node `X` is addressable
/// as `X.output` inside a downstream node's parameter templates").
fn resolve_args(template: &Value, outputs: &HashMap<String, Value>) -> Value {
    match template {
        Value::String(s) => {
            if let Some(node_id) = s.strip_suffix(".output}}").and_then(|s| s.strip_prefix("{{")) {
                outputs.get(node_id).cloned().unwrap_or(Value::Null)
            } else {
                Value::String(s.clone())
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_args(v, outputs)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), resolve_args(v, outputs))).collect())
        }
        other => other.clone(),
    }
}

fn field_lookup<'a>(value: &'a Value, path: Option<&str>) -> &'a Value {
    let Some(path) = path else { return value };
    path.split('.').fold(value, |acc, segment| acc.get(segment).unwrap_or(&Value::Null))
}

fn parse_condition(op: &str) -> EdgeCondition {
    match op {
        "equals" => EdgeCondition::Equals,
        "regex" => EdgeCondition::Regex,
        "greater" => EdgeCondition::Greater,
        "less" => EdgeCondition::Less,
        _ => EdgeCondition::Contains,
    }
}

/// Picks the `true`/`false` branch out of a mapper node by evaluating its
/// configured condition against an upstream node's (optionally
/// field-projected) output.
fn evaluate_mapper(node: &WorkflowNode, outputs: &HashMap<String, Value>, default_source: Option<&str>) -> &'static str {
    let source = node.data.get("source").and_then(Value::as_str).or(default_source);
    let upstream = source.and_then(|id| outputs.get(id)).cloned().unwrap_or(Value::Null);
    let field = node.data.get("field").and_then(Value::as_str);
    let actual = field_lookup(&upstream, field);
    let op = parse_condition(node.data.get("op").and_then(Value::as_str).unwrap_or("contains"));
    let expected = node.data.get("value").and_then(Value::as_str).unwrap_or("");
    if condition::evaluate(op, actual, expected) {
        "true"
    } else {
        "false"
    }
}

/// Nodes reachable from `start_id` by following edges, ignoring mapper
/// branch conditions (those are only resolved at execution time, so
/// reachability here is necessarily conservative — it excludes only nodes
/// with no path from start at all, not branches that might not be taken).
fn reachable_from_start(workflow: &Workflow, start_id: &str) -> HashSet<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.graph.edges {
        adjacency.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
    }
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    visited.insert(start_id.to_string());
    queue.push_back(start_id);
    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(current).into_iter().flatten() {
            if visited.insert(next.to_string()) {
                queue.push_back(next);
            }
        }
    }
    visited
}

/// Collects `required_keys` across every tool/agent node reachable from the
/// start node (spec §4.7 step 4: credentials are gated before any
/// side-effectful work starts, not lazily per node; invariant 7 scopes this
/// to reachable nodes so an unreachable branch's tool can't block a
/// runnable workflow).
fn collect_required_keys(workflow: &Workflow, registry: &ToolRegistry, start_id: &str) -> Result<Vec<String>> {
    let reachable = reachable_from_start(workflow, start_id);
    let mut keys = Vec::new();
    for node in &workflow.graph.nodes {
        if !reachable.contains(&node.id) {
            continue;
        }
        let kind = normalize_kind(&node.raw_type);
        if !tool_or_agent(kind) {
            continue;
        }
        let name = node
            .resolved_name()
            .ok_or_else(|| GasableError::BadRequest(format!("node {} has no resolvable tool/agent name", node.id)))?;
        let tool = registry.get(&name)?;
        for key in &tool.spec().required_keys {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    Ok(keys)
}

/// Executes a persisted workflow graph (spec §4.7). Credential gating
/// happens before any node runs; a missing key aborts with zero
/// executions. `agent_id`/`user_id` scope the Vault lookup the same way
/// the Orchestrator does.
pub async fn run_workflow(
    registry: &ToolRegistry,
    vault: &Vault,
    workflow: &Workflow,
    agent_id: &str,
    user_id: Option<&str>,
    reporter: &dyn StepReporter,
) -> Result<WorkflowResult> {
    let start_nodes: Vec<&WorkflowNode> =
        workflow.graph.nodes.iter().filter(|n| normalize_kind(&n.raw_type) == WorkflowNodeKind::Start).collect();
    if start_nodes.len() != 1 {
        return Err(GasableError::BadRequest(format!("workflow must have exactly one start node, found {}", start_nodes.len())));
    }

    let required_keys = collect_required_keys(workflow, registry, &start_nodes[0].id)?;
    let credentials = vault.resolve_credentials(&required_keys, agent_id, user_id).await;
    let missing: Vec<String> = required_keys.iter().filter(|k| !credentials.contains_key(k.as_str())).cloned().collect();
    if !missing.is_empty() {
        return Ok(WorkflowResult::missing_credentials(missing));
    }

    let mut graph = DiGraph::<String, ()>::new();
    let mut index_of = HashMap::new();
    for node in &workflow.graph.nodes {
        index_of.insert(node.id.clone(), graph.add_node(node.id.clone()));
    }
    for edge in &workflow.graph.edges {
        if let (Some(&from), Some(&to)) = (index_of.get(&edge.source), index_of.get(&edge.target)) {
            graph.add_edge(from, to, ());
        }
    }
    let order = toposort(&graph, None).map_err(|_| GasableError::BadRequest("workflow graph contains a cycle".to_string()))?;

    let nodes_by_id: HashMap<&str, &WorkflowNode> = workflow.graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut arrived: HashSet<String> = HashSet::new();
    arrived.insert(start_nodes[0].id.clone());
    let mut outputs: HashMap<String, Value> = HashMap::new();
    let mut node_results = Vec::new();

    // Group the topological order into waves: a node's wave is one past
    // the highest wave of any predecessor, so nodes sharing a wave have no
    // edge between them and can run concurrently (spec §4.7: "Independent
    // branches may run in parallel; the runtime schedules ready nodes
    // whose in-edges are all satisfied"). The topological order guarantees
    // every predecessor's wave is already known by the time we reach it.
    let mut level: HashMap<String, usize> = HashMap::new();
    for &index in &order {
        let node_id = graph[index].clone();
        let max_pred_level =
            workflow.graph.edges.iter().filter(|e| e.target == node_id).filter_map(|e| level.get(&e.source)).copied().max();
        level.insert(node_id, max_pred_level.map_or(0, |l| l + 1));
    }
    let wave_count = level.values().copied().max().map_or(0, |m| m + 1);
    let mut waves: Vec<Vec<petgraph::graph::NodeIndex>> = vec![Vec::new(); wave_count];
    for index in order {
        waves[level[&graph[index]]].push(index);
    }

    for wave in waves {
        let ready: Vec<petgraph::graph::NodeIndex> = wave.into_iter().filter(|&index| arrived.contains(&graph[index])).collect();

        let mut tool_agent_ids: Vec<String> = Vec::new();
        for index in ready {
            let node_id = graph[index].clone();
            let node = nodes_by_id[node_id.as_str()];
            let out_edges: Vec<&crate::model::WorkflowEdge> = workflow.graph.edges.iter().filter(|e| e.source == node_id).collect();

            match normalize_kind(&node.raw_type) {
                WorkflowNodeKind::Start => {
                    for edge in out_edges {
                        arrived.insert(edge.target.clone());
                    }
                }
                WorkflowNodeKind::Mapper => {
                    let predecessor = workflow.graph.edges.iter().find(|e| e.target == node_id).map(|e| e.source.as_str());
                    let branch = evaluate_mapper(node, &outputs, predecessor);
                    for edge in out_edges {
                        if edge.source_handle.as_deref() == Some(branch) {
                            arrived.insert(edge.target.clone());
                        }
                    }
                    node_results.push(NodeExecutionRecord { node_id: node_id.clone(), status: "ok", error: None });
                }
                WorkflowNodeKind::Tool | WorkflowNodeKind::Agent => tool_agent_ids.push(node_id),
            }
        }

        if tool_agent_ids.is_empty() {
            continue;
        }

        // No edge connects two nodes in the same wave, so each tool/agent
        // call here is independent of the others and runs concurrently
        // against a shared read-only snapshot of `outputs`.
        let outputs_snapshot = &outputs;
        let credentials_snapshot = &credentials;
        let run_node = |node_id: String| {
            let node = nodes_by_id[node_id.as_str()];
            let out_edges: Vec<String> =
                workflow.graph.edges.iter().filter(|e| e.source == node_id).map(|e| e.target.clone()).collect();
            async move {
                reporter.emit("node_started", json!({ "node_id": node_id }));
                let name = node.resolved_name().expect("validated during credential collection");
                let args = resolve_args(node.data.get("args").unwrap_or(&Value::Null), outputs_snapshot);
                let timeout = Duration::from_millis(node.timeout_ms());
                let attempts = node.retries() + 1;

                let mut last_error = None;
                let mut success = None;
                for _ in 0..attempts {
                    let call = registry.invoke(&name, args.clone(), None, credentials_snapshot, None, user_id.map(String::from));
                    match tokio::time::timeout(timeout, call).await {
                        Ok(Ok(result)) if result.is_ok() => {
                            success = Some(result);
                            break;
                        }
                        Ok(Ok(result)) => last_error = Some(format!("{result:?}")),
                        Ok(Err(e)) => last_error = Some(e.to_string()),
                        Err(_) => last_error = Some(format!("node {node_id} timed out after {}ms", timeout.as_millis())),
                    }
                }

                (node_id, out_edges, node.continue_on_error(), success, last_error)
            }
        };

        let results = futures::future::join_all(tool_agent_ids.into_iter().map(run_node)).await;

        let mut wave_failed = false;
        for (node_id, out_edges, continue_on_error, success, last_error) in results {
            match success {
                Some(result) => {
                    let data = match &result {
                        crate::tools::ToolResult::Ok { data } => data.clone(),
                        crate::tools::ToolResult::Error { .. } => Value::Null,
                    };
                    outputs.insert(node_id.clone(), data);
                    node_results.push(NodeExecutionRecord { node_id: node_id.clone(), status: "ok", error: None });
                    reporter.emit("node_finished", json!({ "node_id": node_id, "status": "ok" }));
                    for target in out_edges {
                        arrived.insert(target);
                    }
                }
                None => {
                    let error = last_error.unwrap_or_else(|| "node failed".to_string());
                    node_results.push(NodeExecutionRecord { node_id: node_id.clone(), status: "error", error: Some(error.clone()) });
                    reporter.emit("node_failed", json!({ "node_id": node_id, "error": error }));

                    if continue_on_error {
                        for target in out_edges {
                            arrived.insert(target);
                        }
                    } else {
                        wave_failed = true;
                    }
                }
            }
        }

        if wave_failed {
            reporter.emit("workflow_finished", json!({ "status": "error" }));
            return Ok(WorkflowResult {
                status: "error",
                error_kind: Some(ErrorKind::ToolError),
                required_keys: Vec::new(),
                outputs,
                node_results,
            });
        }
    }

    reporter.emit("workflow_finished", json!({ "status": "ok" }));
    Ok(WorkflowResult { status: "ok", error_kind: None, required_keys: Vec::new(), outputs, node_results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ToolSpec, WorkflowEdge, WorkflowGraph};
    use crate::retriever::NoopReporter;
    use crate::store::MemStore;
    use crate::tools::{Tool, ToolContext, ToolResult};
    use async_trait::async_trait;
    use std::sync::Arc;

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

    struct FailingTool(ToolSpec);

    #[async_trait]
    impl Tool for FailingTool {
        fn spec(&self) -> &ToolSpec {
            &self.0
        }
        async fn invoke(&self, _args: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::error("boom")
        }
    }

    fn start_node() -> WorkflowNode {
        WorkflowNode { id: "start".to_string(), raw_type: "startNode".to_string(), data: json!({}), position: None }
    }

    fn tool_node(id: &str, tool: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            raw_type: "toolNode".to_string(),
            data: json!({ "tool": tool, "args": {} }),
            position: None,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> WorkflowEdge {
        WorkflowEdge { id: id.to_string(), source: source.to_string(), target: target.to_string(), source_handle: None, target_handle: None }
    }

    fn workflow_of(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Workflow {
        Workflow { id: "wf1".to_string(), display_name: "test".to_string(), namespace: "global".to_string(), graph: WorkflowGraph { nodes, edges } }
    }

    #[tokio::test]
    async fn linear_two_node_workflow_executes_in_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("echo", "echoes"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);
        let workflow = workflow_of(
            vec![start_node(), tool_node("n1", "echo")],
            vec![edge("e1", "start", "n1")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        assert_eq!(result.node_results.len(), 1);
        assert_eq!(result.node_results[0].node_id, "n1");
    }

    #[tokio::test]
    async fn missing_credentials_abort_before_any_node_runs() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(
            ToolSpec::new("gmail.send", "sends email").with_required_keys(vec![
                "GOOGLE_CLIENT_ID".to_string(),
                "GOOGLE_CLIENT_SECRET".to_string(),
                "GOOGLE_REFRESH_TOKEN".to_string(),
            ]),
        )));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);
        let workflow = workflow_of(
            vec![start_node(), tool_node("n1", "gmail.send")],
            vec![edge("e1", "start", "n1")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "error");
        assert_eq!(result.error_kind, Some(ErrorKind::MissingCredential));
        assert!(result.node_results.is_empty());
        let mut keys = result.required_keys.clone();
        keys.sort();
        assert_eq!(keys, vec!["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET", "GOOGLE_REFRESH_TOKEN"]);
    }

    #[tokio::test]
    async fn providing_credentials_then_rerunning_succeeds() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(
            ToolSpec::new("gmail.send", "sends email").with_required_keys(vec!["GOOGLE_CLIENT_ID".to_string()]),
        )));
        let store = Arc::new(MemStore::default());
        let vault = Vault::new(store, [3u8; 32]);
        vault.put("agent:support", "GOOGLE_CLIENT_ID", "abc").await.unwrap();
        let workflow = workflow_of(
            vec![start_node(), tool_node("n1", "gmail.send")],
            vec![edge("e1", "start", "n1")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        assert_eq!(result.node_results.len(), 1);
        assert_eq!(result.node_results[0].status, "ok");
    }

    #[tokio::test]
    async fn unreachable_node_required_keys_do_not_block_execution() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("echo", "echoes"))));
        registry.register(Arc::new(EchoTool(
            ToolSpec::new("gmail.send", "sends email").with_required_keys(vec!["GOOGLE_CLIENT_ID".to_string()]),
        )));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);
        // "orphan" has no edge from "start" at all, so it's unreachable and
        // its required key must not gate the reachable "n1" path.
        let workflow = workflow_of(
            vec![start_node(), tool_node("n1", "echo"), tool_node("orphan", "gmail.send")],
            vec![edge("e1", "start", "n1")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        assert_eq!(result.node_results.len(), 1);
        assert_eq!(result.node_results[0].node_id, "n1");
    }

    #[tokio::test]
    async fn fail_fast_aborts_remaining_nodes_on_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool(ToolSpec::new("bad", "always fails"))));
        registry.register(Arc::new(EchoTool(ToolSpec::new("echo", "echoes"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);
        let workflow = workflow_of(
            vec![start_node(), tool_node("n1", "bad"), tool_node("n2", "echo")],
            vec![edge("e1", "start", "n1"), edge("e2", "n1", "n2")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "error");
        assert_eq!(result.node_results.len(), 1);
        assert_eq!(result.node_results[0].node_id, "n1");
    }

    #[tokio::test]
    async fn continue_policy_proceeds_past_a_failed_node() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool(ToolSpec::new("bad", "always fails"))));
        registry.register(Arc::new(EchoTool(ToolSpec::new("echo", "echoes"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);
        let mut failing_node = tool_node("n1", "bad");
        failing_node.data = json!({ "tool": "bad", "args": {}, "errorPolicy": "continue" });
        let workflow = workflow_of(
            vec![start_node(), failing_node, tool_node("n2", "echo")],
            vec![edge("e1", "start", "n1"), edge("e2", "n1", "n2")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        assert_eq!(result.node_results.len(), 2);
        assert_eq!(result.node_results[0].status, "error");
        assert_eq!(result.node_results[1].status, "ok");
    }

    #[tokio::test]
    async fn mapper_node_selects_true_branch_and_skips_false_branch() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("a", "a"))));
        registry.register(Arc::new(EchoTool(ToolSpec::new("b", "b"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);

        let mut producer = tool_node("producer", "a");
        producer.data = json!({ "tool": "a", "args": { "value": "ok" } });
        let mapper = WorkflowNode {
            id: "mapper".to_string(),
            raw_type: "decisionNode".to_string(),
            data: json!({ "field": "value", "op": "equals", "value": "ok" }),
            position: None,
        };
        let true_branch = tool_node("true_branch", "b");
        let false_branch = tool_node("false_branch", "b");

        let workflow = workflow_of(
            vec![start_node(), producer, mapper, true_branch, false_branch],
            vec![
                edge("e1", "start", "producer"),
                edge("e2", "producer", "mapper"),
                WorkflowEdge { id: "e3".to_string(), source: "mapper".to_string(), target: "true_branch".to_string(), source_handle: Some("true".to_string()), target_handle: None },
                WorkflowEdge { id: "e4".to_string(), source: "mapper".to_string(), target: "false_branch".to_string(), source_handle: Some("false".to_string()), target_handle: None },
            ],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        let executed: Vec<&str> = result.node_results.iter().map(|r| r.node_id.as_str()).collect();
        assert!(executed.contains(&"true_branch"));
        assert!(!executed.contains(&"false_branch"));
    }

    #[tokio::test]
    async fn downstream_node_can_reference_upstream_output_via_template() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("a", "a"))));
        registry.register(Arc::new(EchoTool(ToolSpec::new("b", "b"))));
        let vault = Vault::new(Arc::new(MemStore::default()), [3u8; 32]);

        let mut producer = tool_node("producer", "a");
        producer.data = json!({ "tool": "a", "args": { "value": "hello" } });
        let mut consumer = tool_node("consumer", "b");
        consumer.data = json!({ "tool": "b", "args": { "input": "{{producer.output}}" } });

        let workflow = workflow_of(
            vec![start_node(), producer, consumer],
            vec![edge("e1", "start", "producer"), edge("e2", "producer", "consumer")],
        );

        let result = run_workflow(&registry, &vault, &workflow, "support", None, &NoopReporter).await.unwrap();
        assert_eq!(result.status, "ok");
        let consumer_output = result.outputs.get("consumer").unwrap();
        assert_eq!(consumer_output["input"]["value"], json!("hello"));
    }
}
