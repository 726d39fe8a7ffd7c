//! C2: thin RPC wrappers over the external embedding + chat providers.
//!
//! Exposes `Embedder`/`ChatClient` traits (grounded on the teacher's
//! `memory::Embedder`/`OpenAIEmbedder`) implemented over `async-openai`.
//! Both carry an in-process `(model, text)` LRU+TTL cache (spec §4.2) and
//! retry 429/5xx with jittered exponential backoff up to a bounded deadline.

mod chat;
mod embedder;
mod retry;

pub use chat::{ChatClient, ChatMessage, ChatReply, OpenAiChatClient, ToolCall, ToolDef};
pub use embedder::{Embedder, OpenAiEmbedder};
pub use retry::retry_with_backoff;
