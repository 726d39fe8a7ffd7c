//! C5: tool registry (spec §4.5). Enumerates built-in + DB-defined tools,
//! merges `required_keys` inferred from `auth.provider`, validates a call
//! against an agent's allow-list, and dispatches with credentials injected
//! into a per-call context.
//!
//! `Tool` is grounded on the teacher's `tool_source::ToolSource` trait
//! (`graphweave/src/tool_source/mod.rs`): an async, `Send + Sync` trait that
//! the orchestrator depends on instead of a concrete implementation.
//! `ToolContext` is grounded on the teacher's `ToolCallContext`
//! (`tool_source/context.rs`) — per-call state handed to a tool alongside
//! its arguments, minus the conversation-replay fields this system's tools
//! don't need.

mod gmail;
mod http_fetch;
mod orders;
mod retrieval_search;

pub use gmail::GmailSendTool;
pub use http_fetch::HttpFetchTool;
pub use orders::OrdersPlaceTool;
pub use retrieval_search::RetrievalSearchTool;

use crate::error::{GasableError, Result};
use crate::model::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Per-call context: resolved credentials (already fetched from the Vault
/// for this tool's `required_keys`) and the run's identifiers.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub credentials: HashMap<String, String>,
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
}

/// `{status: "ok"|"error", ...}` (spec §4.5): tool errors never throw, they
/// are reported as data so the orchestrator can feed them back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Ok {
        #[serde(flatten)]
        data: Value,
    },
    Error {
        error: String,
    },
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        ToolResult::Ok { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error { error: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok { .. })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.spec().name.clone(), tool);
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools.get(name).cloned().ok_or_else(|| GasableError::NotFound(format!("tool not found: {name}")))
    }

    /// Validates `name` against `allowed` (when present), checks
    /// `required_keys` are all present in `credentials`, then dispatches.
    /// Missing credentials or an allow-list violation abort before any
    /// side effect — nothing in `Tool::invoke` runs.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        allowed: Option<&HashSet<String>>,
        credentials: &HashMap<String, String>,
        thread_id: Option<String>,
        user_id: Option<String>,
    ) -> Result<ToolResult> {
        if let Some(allowed) = allowed {
            if !allowed.contains(name) {
                return Err(GasableError::Forbidden(format!("tool not in allow-list: {name}")));
            }
        }

        let tool = self.get(name)?;
        let missing: Vec<String> = tool
            .spec()
            .required_keys
            .iter()
            .filter(|k| !credentials.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(GasableError::MissingCredential(missing));
        }

        let ctx = ToolContext {
            credentials: credentials.clone(),
            thread_id,
            user_id,
        };
        Ok(tool.invoke(args, &ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn registry_with_echo(required_keys: Vec<String>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool(ToolSpec::new("echo", "echoes its args").with_required_keys(required_keys))));
        registry
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke("missing", Value::Null, None, &HashMap::new(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invoke_outside_allow_list_is_forbidden() {
        let registry = registry_with_echo(vec![]);
        let allowed: HashSet<String> = HashSet::new();
        let err = registry
            .invoke("echo", Value::Null, Some(&allowed), &HashMap::new(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn invoke_missing_required_key_aborts_before_dispatch() {
        let registry = registry_with_echo(vec!["SECRET_KEY".to_string()]);
        let err = registry
            .invoke("echo", Value::Null, None, &HashMap::new(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingCredential);
    }

    #[tokio::test]
    async fn invoke_dispatches_when_allowed_and_credentials_present() {
        let registry = registry_with_echo(vec!["SECRET_KEY".to_string()]);
        let allowed: HashSet<String> = ["echo".to_string()].into_iter().collect();
        let mut creds = HashMap::new();
        creds.insert("SECRET_KEY".to_string(), "value".to_string());
        let result = registry
            .invoke("echo", serde_json::json!({"x": 1}), Some(&allowed), &creds, None, None)
            .await
            .unwrap();
        assert!(result.is_ok());
    }
}
