//! `GET/POST /api/mcp_tools`, `POST /api/mcp_invoke` (spec §6, §4.5).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use gasable_core::model::ToolSpec;
use gasable_core::GasableError;
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppState;
use crate::error::ApiError;

/// Built-in (registry) tools merged with DB-registered specs, deduped by
/// name with the registry's live spec taking precedence (spec §4.5:
/// "enumerates built-in + DB-defined tools").
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ToolSpec>>, ApiError> {
    let mut specs = state.registry.list();
    let known: std::collections::HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
    let stored = state.store.list_tools().await?;
    specs.extend(stored.into_iter().filter(|s| !known.contains(&s.name)));
    Ok(Json(specs))
}

/// Registers a tool's metadata for discovery/display. Only tools also
/// registered in the in-process [`gasable_core::tools::ToolRegistry`] are
/// actually dispatchable through `/api/mcp_invoke` — a DB row alone
/// describes a tool, it doesn't implement one.
pub async fn register(State(state): State<Arc<AppState>>, Json(spec): Json<ToolSpec>) -> Result<Json<ToolSpec>, ApiError> {
    state.store.upsert_tool(&spec).await?;
    Ok(Json(spec))
}

#[derive(Debug, Deserialize)]
pub struct InvokeBody {
    pub name: String,
    pub args: Value,
    pub token: Option<String>,
    pub user_id: Option<String>,
}

fn check_token(state: &AppState, token: Option<&str>) -> Result<(), GasableError> {
    match &state.config.api_token {
        Some(expected) if Some(expected.as_str()) != token => {
            Err(GasableError::Forbidden("mcp token mismatch".to_string()))
        }
        _ => Ok(()),
    }
}

pub async fn invoke(State(state): State<Arc<AppState>>, Json(body): Json<InvokeBody>) -> Result<Json<Value>, ApiError> {
    check_token(&state, body.token.as_deref())?;

    let required_keys = state.registry.get(&body.name)?.spec().required_keys.clone();
    let credentials = state
        .vault
        .resolve_credentials(&required_keys, "global", body.user_id.as_deref())
        .await;

    let result = state
        .registry
        .invoke(&body.name, body.args, None, &credentials, None, body.user_id)
        .await?;
    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}
