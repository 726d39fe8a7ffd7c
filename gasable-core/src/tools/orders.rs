//! Built-in `orders.place` tool: a generic webhook-style tool that POSTs its
//! arguments to a credential-supplied endpoint, mirroring [`super::http_fetch`]
//! but adding bearer auth resolved from the Vault (provider `"orders"`).

use super::{Tool, ToolContext, ToolResult};
use crate::model::{required_keys_for_provider, ToolAuth, ToolSpec};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct OrdersPlaceTool {
    client: reqwest::Client,
    spec: ToolSpec,
}

impl Default for OrdersPlaceTool {
    fn default() -> Self {
        Self::new()
    }
}

impl OrdersPlaceTool {
    pub fn new() -> Self {
        let spec = ToolSpec::new("orders.place", "Places an order against the configured orders API")
            .with_required_keys(required_keys_for_provider("orders"));
        let mut spec = spec;
        spec.auth = Some(ToolAuth { provider: "orders".to_string(), auth_type: "api_key".to_string() });
        Self { client: reqwest::Client::new(), spec }
    }
}

#[async_trait]
impl Tool for OrdersPlaceTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if !args.is_object() || args.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return ToolResult::error("missing required field: order payload");
        }

        let (Some(api_key), Some(api_url)) =
            (ctx.credentials.get("ORDERS_API_KEY"), ctx.credentials.get("ORDERS_API_URL"))
        else {
            return ToolResult::error("missing orders API credentials");
        };

        let response = self.client.post(api_url).bearer_auth(api_key).json(&args).send().await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => ToolResult::ok(body),
                Err(_) => ToolResult::ok(json!({ "accepted": true })),
            },
            Ok(resp) => ToolResult::error(format!("orders API returned {}", resp.status())),
            Err(e) => ToolResult::error(format!("orders API request failed: {e}")),
        }
    }
}
