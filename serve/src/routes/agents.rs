//! `GET/POST /api/agents`, `POST /api/agents/{id}/rotate_key` (spec §6, §3).

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use config::RagOverrides;
use gasable_core::model::Agent;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub namespace: Option<String>,
}

pub async fn list(State(state): State<Arc<AppState>>, Query(params): Query<ListParams>) -> Result<Json<Vec<Agent>>, ApiError> {
    let namespace = params.namespace.unwrap_or_else(|| "global".to_string());
    let agents = state.store.list_agents(&namespace).await?;
    Ok(Json(agents))
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentBody {
    pub id: String,
    pub display_name: String,
    pub namespace: Option<String>,
    pub system_prompt: String,
    pub tool_allowlist: Option<HashSet<String>>,
    pub answer_model: Option<String>,
    pub rerank_model: Option<String>,
    pub top_k: Option<usize>,
    pub rag_settings: Option<RagOverrides>,
}

pub async fn create(State(state): State<Arc<AppState>>, Json(body): Json<CreateAgentBody>) -> Result<Json<Agent>, ApiError> {
    let agent = Agent {
        id: body.id,
        display_name: body.display_name,
        namespace: body.namespace.unwrap_or_else(|| "global".to_string()),
        system_prompt: body.system_prompt,
        tool_allowlist: body.tool_allowlist.unwrap_or_default(),
        answer_model: body.answer_model.unwrap_or_else(|| state.config.openai_model.clone()),
        rerank_model: body.rerank_model.unwrap_or_else(|| state.config.rerank_model.clone()),
        top_k: body.top_k.unwrap_or(state.config.rag_defaults.final_k),
        assistant_id: None,
        api_key: None,
        rag_settings: body.rag_settings.unwrap_or_default(),
    };
    state.store.upsert_agent(&agent).await?;
    Ok(Json(agent))
}

/// Reissues the agent's bearer `api_key`, a standalone field on `Agent`
/// distinct from the Vault's per-tool credentials (spec §3 Agent entity).
pub async fn rotate_key(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let mut agent = state.store.get_agent(&id).await?;
    let new_key = Uuid::new_v4().to_string();
    agent.api_key = Some(new_key.clone());
    state.store.upsert_agent(&agent).await?;
    Ok(Json(json!({ "id": agent.id, "api_key": new_key })))
}
