//! Workflow entity: persisted node graph (spec §3, §4.7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub display_name: String,
    pub namespace: String,
    pub graph: WorkflowGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

/// UI-flavored node kinds. `Runtime::normalize` (see `crate::workflow`) maps
/// arbitrary incoming labels (`"startNode"`, `"toolNode"`, `"decisionNode"`,
/// ...) onto this fixed set before execution (spec §4.7 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNodeKind {
    Start,
    Tool,
    Agent,
    Mapper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub raw_type: String,
    pub data: Value,
    #[serde(default)]
    pub position: Option<Value>,
}

impl WorkflowNode {
    /// Resolved tool/agent name for `tool`/`agent` nodes: `node.tool` field
    /// first, falling back to `node.data.toolName` (spec §4.7 step 2).
    pub fn resolved_name(&self) -> Option<String> {
        self.data
            .get("tool")
            .or_else(|| self.data.get("toolName"))
            .or_else(|| self.data.get("agentName"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        self.data
            .get("timeoutMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(60_000)
    }

    pub fn retries(&self) -> u32 {
        self.data.get("retries").and_then(|v| v.as_u64()).unwrap_or(0) as u32
    }

    pub fn continue_on_error(&self) -> bool {
        self.data
            .get("errorPolicy")
            .and_then(|v| v.as_str())
            .map(|s| s == "continue")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    Contains,
    Equals,
    Regex,
    Greater,
    Less,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}
