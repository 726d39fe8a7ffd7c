//! Core library: data model, storage, LLM clients, retrieval, answering,
//! tools, orchestration, workflow runtime, credential vault, and status.
//! The `server` crate wires these behind HTTP/SSE; `cli` wires them behind
//! a command-line front door.

pub mod answerer;
pub mod cache;
pub mod error;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod retriever;
pub mod status;
pub mod store;
pub mod tools;
pub mod vault;
pub mod workflow;

pub use error::{ErrorKind, GasableError, Result};
