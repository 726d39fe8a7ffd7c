//! Agent entity (spec §3).

use config::RagOverrides;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub namespace: String,
    pub system_prompt: String,
    pub tool_allowlist: HashSet<String>,
    pub answer_model: String,
    pub rerank_model: String,
    pub top_k: usize,
    pub assistant_id: Option<String>,
    pub api_key: Option<String>,
    pub rag_settings: RagOverrides,
}

impl Agent {
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.tool_allowlist.contains(tool_name)
    }
}
