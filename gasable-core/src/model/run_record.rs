//! RunRecord entity (spec §3): one append-only row per orchestration call.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub status: String,
    pub error_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub user_id: String,
    pub namespace: String,
    pub selected_agent: String,
    pub user_message: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub result_summary: String,
    pub elapsed_ms: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
