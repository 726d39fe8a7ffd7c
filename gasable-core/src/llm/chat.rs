//! C2 (chat half): `chat(model, messages, tools?) -> {content, tool_calls?}`
//! (spec §4.2), used by the orchestrator's ReAct loop, the answerer's JSON
//! synthesis step, and the workflow runtime's agent nodes.

use super::retry::{is_transient, retry_with_backoff};
use crate::cache::{Cache, InMemoryCache};
use crate::error::{GasableError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;

/// One turn of conversation, independent of any particular wire format.
#[derive(Debug, Clone)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant { content: Option<String>, tool_calls: Option<Vec<ToolCall>> },
    Tool { tool_call_id: String, content: String },
}

/// A tool the model may choose to invoke, described as OpenAI function
/// calling expects (name + JSON Schema parameters).
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDef>>,
    ) -> Result<ChatReply>;
}

pub struct OpenAiChatClient {
    client: Client<OpenAIConfig>,
    cache: InMemoryCache<(String, String), ChatReply>,
    retry_deadline: Duration,
}

impl OpenAiChatClient {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self {
            client,
            cache: InMemoryCache::new(),
            retry_deadline: Duration::from_secs(20),
        }
    }

    pub fn with_retry_deadline(mut self, deadline: Duration) -> Self {
        self.retry_deadline = deadline;
        self
    }
}

fn to_request_message(m: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    Ok(match m {
        ChatMessage::System(text) => {
            ChatCompletionRequestSystemMessage::from(text.as_str()).into()
        }
        ChatMessage::User(text) => {
            ChatCompletionRequestUserMessage::from(text.as_str()).into()
        }
        ChatMessage::Assistant { content, tool_calls } => {
            let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
            if let Some(content) = content {
                builder.content(content.as_str());
            }
            if let Some(calls) = tool_calls {
                let calls: Vec<ChatCompletionMessageToolCalls> = calls
                    .iter()
                    .map(|c| {
                        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                            id: c.id.clone(),
                            function: FunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.clone(),
                            },
                        })
                    })
                    .collect();
                builder.tool_calls(calls);
            }
            builder
                .build()
                .map_err(|e| GasableError::Internal(e.to_string()))?
                .into()
        }
        ChatMessage::Tool { tool_call_id, content } => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(tool_call_id.as_str())
            .content(content.as_str())
            .build()
            .map_err(|e| GasableError::Internal(e.to_string()))?
            .into(),
    })
}

fn to_request_tool(t: &ToolDef) -> Result<ChatCompletionTools> {
    let function = FunctionObjectArgs::default()
        .name(t.name.clone())
        .description(t.description.clone())
        .parameters(t.parameters.clone())
        .build()
        .map_err(|e| GasableError::Internal(e.to_string()))?;
    Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDef>>,
    ) -> Result<ChatReply> {
        // Keyed on (model, transcript+tools) rather than just the latest
        // message so a cache hit requires an identical conversation state,
        // matching the embedder's "identical input" determinism (spec §4.2).
        let cache_key = (model.to_string(), format!("{messages:?}|{tools:?}"));
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;
        let request_tools = tools
            .as_ref()
            .map(|ts| ts.iter().map(to_request_tool).collect::<Result<Vec<_>>>())
            .transpose()?;

        let model = model.to_string();
        let reply = retry_with_backoff(self.retry_deadline, is_transient, || {
            let mut builder = CreateChatCompletionRequestArgs::default();
            builder.model(model.clone()).messages(request_messages.clone());
            if let Some(tools) = request_tools.clone() {
                builder.tools(tools);
            }
            async move {
                let request = builder.build().map_err(|e| GasableError::Internal(e.to_string()))?;
                let response = self.client.chat().create(request).await.map_err(map_openai_err)?;
                let choice = response
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| GasableError::UpstreamUnavailable("empty chat completion".into()))?;
                let tool_calls = choice.message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .filter_map(|c| match c {
                            ChatCompletionMessageToolCalls::Function(f) => Some(ToolCall {
                                id: f.id,
                                name: f.function.name,
                                arguments: f.function.arguments,
                            }),
                            ChatCompletionMessageToolCalls::Custom(_) => None,
                        })
                        .collect::<Vec<_>>()
                });
                Ok(ChatReply {
                    content: choice.message.content,
                    tool_calls: tool_calls.filter(|v| !v.is_empty()),
                })
            }
        })
        .await?;
        self.cache.set(cache_key, reply.clone(), Some(Duration::from_secs(600))).await;
        Ok(reply)
    }
}

fn map_openai_err(e: async_openai::error::OpenAIError) -> GasableError {
    use async_openai::error::OpenAIError;
    match e {
        OpenAIError::Reqwest(_) => GasableError::UpstreamUnavailable(e.to_string()),
        OpenAIError::ApiError(ref api) if api.code.as_deref() == Some("rate_limit_exceeded") => {
            GasableError::UpstreamUnavailable(e.to_string())
        }
        other => GasableError::Internal(other.to_string()),
    }
}
