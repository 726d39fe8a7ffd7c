//! Built-in `http_fetch` tool: GET a URL and return its body, truncated to
//! a sane size so a single fetch can't blow the orchestrator's context.

use super::{Tool, ToolContext, ToolResult};
use crate::model::ToolSpec;
use async_trait::async_trait;
use serde_json::{json, Value};

const MAX_BODY_CHARS: usize = 20_000;

pub struct HttpFetchTool {
    client: reqwest::Client,
    spec: ToolSpec,
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetchTool {
    pub fn new() -> Self {
        let spec = ToolSpec::new("http_fetch", "Fetches a URL over HTTP and returns its body")
            .with_required_keys(vec![]);
        Self { client: reqwest::Client::new(), spec }
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(url) = args.get("url").and_then(Value::as_str) else {
            return ToolResult::error("missing required field: url");
        };

        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                match response.text().await {
                    Ok(body) => {
                        let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
                        if status.is_success() {
                            ToolResult::ok(json!({ "status_code": status.as_u16(), "body": truncated }))
                        } else {
                            ToolResult::error(format!("http {status}: {truncated}"))
                        }
                    }
                    Err(e) => ToolResult::error(format!("failed to read response body: {e}")),
                }
            }
            Err(e) => ToolResult::error(format!("request failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_field_errors_without_dispatch() {
        let tool = HttpFetchTool::new();
        let result = tool.invoke(json!({}), &ToolContext::default()).await;
        assert!(!result.is_ok());
    }
}
