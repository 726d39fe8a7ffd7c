//! Built-in `gmail.send` tool (spec §4.5 worked example: `auth.provider =
//! "gmail"` -> `{GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET,
//! GOOGLE_REFRESH_TOKEN}`). Exchanges the stored refresh token for an access
//! token, then calls the Gmail API's `messages.send` with a raw RFC 822
//! message base64url-encoded per the API's wire format.

use super::{Tool, ToolContext, ToolResult};
use crate::model::{required_keys_for_provider, ToolAuth, ToolSpec};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct GmailSendTool {
    client: reqwest::Client,
    spec: ToolSpec,
}

impl Default for GmailSendTool {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailSendTool {
    pub fn new() -> Self {
        let spec = ToolSpec::new("gmail.send", "Sends an email via the Gmail API")
            .with_required_keys(required_keys_for_provider("gmail"));
        let mut spec = spec;
        spec.auth = Some(ToolAuth { provider: "gmail".to_string(), auth_type: "oauth2".to_string() });
        Self { client: reqwest::Client::new(), spec }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl Tool for GmailSendTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let (Some(to), Some(subject), Some(body)) = (
            args.get("to").and_then(Value::as_str),
            args.get("subject").and_then(Value::as_str),
            args.get("body").and_then(Value::as_str),
        ) else {
            return ToolResult::error("missing required field: to, subject, or body");
        };

        let client_id = ctx.credentials.get("GOOGLE_CLIENT_ID");
        let client_secret = ctx.credentials.get("GOOGLE_CLIENT_SECRET");
        let refresh_token = ctx.credentials.get("GOOGLE_REFRESH_TOKEN");
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (client_id, client_secret, refresh_token)
        else {
            // The registry already enforces required_keys before dispatch;
            // this only guards against a caller constructing ToolContext by hand.
            return ToolResult::error("missing Google OAuth credentials");
        };

        let access_token = match self.exchange_refresh_token(client_id, client_secret, refresh_token).await {
            Ok(token) => token,
            Err(e) => return ToolResult::error(format!("token exchange failed: {e}")),
        };

        let raw_message = format!("To: {to}\r\nSubject: {subject}\r\n\r\n{body}");
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw_message);

        let response = self
            .client
            .post("https://gmail.googleapis.com/gmail/v1/users/me/messages/send")
            .bearer_auth(access_token)
            .json(&json!({ "raw": encoded }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => ToolResult::ok(json!({ "to": to, "subject": subject })),
            Ok(resp) => ToolResult::error(format!("gmail API returned {}", resp.status())),
            Err(e) => ToolResult::error(format!("gmail API request failed: {e}")),
        }
    }
}

impl GmailSendTool {
    async fn exchange_refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<String, String> {
        let response = self
            .client
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("oauth token endpoint returned {}", response.status()));
        }

        response
            .json::<TokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_keys_match_gmail_provider() {
        let tool = GmailSendTool::new();
        assert_eq!(
            tool.spec().required_keys,
            vec!["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET", "GOOGLE_REFRESH_TOKEN"]
        );
    }

    #[tokio::test]
    async fn missing_body_fields_error_without_dispatch() {
        let tool = GmailSendTool::new();
        let result = tool.invoke(json!({ "to": "a@b.com" }), &ToolContext::default()).await;
        assert!(!result.is_ok());
    }
}
