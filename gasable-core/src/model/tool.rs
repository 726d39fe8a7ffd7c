//! Tool (node spec) entity (spec §3, §4.5).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAuth {
    pub provider: String,
    #[serde(rename = "type")]
    pub auth_type: String,
}

/// Static description of a callable tool. `required_keys` are Vault key
/// names that must be present before dispatch (spec §4.1's `required_keys`
/// invariant: fetched before dispatch; missing keys abort with
/// `MissingCredential` before any side effect).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub category: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub required_keys: Vec<String>,
    pub auth: Option<ToolAuth>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: "general".to_string(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            required_keys: Vec::new(),
            auth: None,
        }
    }

    pub fn with_required_keys(mut self, keys: Vec<String>) -> Self {
        self.required_keys = keys;
        self
    }
}

/// Infers `required_keys` from a tool's `auth.provider`, per spec §4.5(b)'s
/// worked example (`gmail` -> Google OAuth triplet). Providers with no
/// known key set return an empty list (the tool declares its own keys
/// directly in that case).
pub fn required_keys_for_provider(provider: &str) -> Vec<String> {
    match provider {
        "gmail" | "google" => vec![
            "GOOGLE_CLIENT_ID".to_string(),
            "GOOGLE_CLIENT_SECRET".to_string(),
            "GOOGLE_REFRESH_TOKEN".to_string(),
        ],
        "exa" => vec!["EXA_API_KEY".to_string()],
        "firecrawl" => vec!["FIRECRAWL_API_KEY".to_string()],
        "orders" => vec!["ORDERS_API_KEY".to_string(), "ORDERS_API_URL".to_string()],
        _ => Vec::new(),
    }
}
