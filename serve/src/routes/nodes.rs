//! `GET /api/nodes`, `POST /api/nodes/install`, `POST /api/nodes/run`
//! (spec §6, §4.5). "Nodes" are the same persisted [`ToolSpec`] rows
//! `/api/mcp_tools` lists — this surface is the workflow-authoring UI's
//! view onto them (install a spec, dry-run one node outside a workflow).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use gasable_core::model::ToolSpec;
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppState;
use crate::error::ApiError;

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ToolSpec>>, ApiError> {
    Ok(Json(state.store.list_tools().await?))
}

pub async fn install(State(state): State<Arc<AppState>>, Json(spec): Json<ToolSpec>) -> Result<Json<ToolSpec>, ApiError> {
    state.store.upsert_tool(&spec).await?;
    Ok(Json(spec))
}

#[derive(Debug, Deserialize)]
pub struct RunBody {
    pub name: String,
    pub args: Value,
}

pub async fn run(State(state): State<Arc<AppState>>, Json(body): Json<RunBody>) -> Result<Json<Value>, ApiError> {
    let required_keys = state.registry.get(&body.name)?.spec().required_keys.clone();
    let credentials = state.vault.resolve_credentials(&required_keys, "global", None).await;
    let result = state.registry.invoke(&body.name, body.args, None, &credentials, None, None).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}
