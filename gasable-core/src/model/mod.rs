//! Entities from the data model: Chunk, Agent, Tool, Workflow, Secret,
//! RunRecord, Job. Plain data; invariants are enforced by the components
//! that construct and persist them (see `store`, `tools`, `workflow`).

mod agent;
mod chunk;
mod job;
mod run_record;
mod secret;
mod tool;
mod workflow;

pub use agent::Agent;
pub use chunk::Chunk;
pub use job::{Job, JobStatus};
pub use run_record::{RunRecord, ToolCallRecord};
pub use secret::Secret;
pub use tool::{required_keys_for_provider, ToolAuth, ToolSpec};
pub use workflow::{
    EdgeCondition, Workflow, WorkflowEdge, WorkflowGraph, WorkflowNode, WorkflowNodeKind,
};

/// Owner of a chunk/agent row: either a specific agent, or the shared
/// `"default"` owner readable by every agent (spec §3 Ownership).
pub const DEFAULT_AGENT_ID: &str = "default";

/// All retrieval queries must filter on `(agent_id = $agent OR agent_id =
/// 'default') AND namespace = $ns` (spec §3). Centralized here so every
/// query site builds the same predicate.
pub fn owner_matches(row_agent_id: &str, requested_agent_id: &str) -> bool {
    row_agent_id == requested_agent_id || row_agent_id == DEFAULT_AGENT_ID
}
