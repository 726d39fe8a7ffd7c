//! `GET /api/keys`, `POST /api/keys/mcp_token/rotate` (spec §6, §4.8).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use gasable_core::vault::GLOBAL_SCOPE;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Key *names* only, never plaintext — mirrors `Vault::list`'s own
/// contract (spec §4.8: `get` is the only operation that ever sees a
/// plaintext secret, and only for the lifetime of one tool dispatch).
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.vault.list(GLOBAL_SCOPE).await?))
}

const MCP_TOKEN_KEY: &str = "MCP_TOKEN";

/// Rotates the global `MCP_TOKEN` secret and returns the new plaintext
/// once — the only endpoint that ever does, since every other secret read
/// path stays inside the Vault/Tool Registry boundary.
pub async fn rotate_mcp_token(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let new_token = Uuid::new_v4().to_string();
    let version = match state.vault.get(GLOBAL_SCOPE, MCP_TOKEN_KEY).await {
        Ok(_) => state.vault.rotate(GLOBAL_SCOPE, MCP_TOKEN_KEY, &new_token).await?,
        Err(_) => state.vault.put(GLOBAL_SCOPE, MCP_TOKEN_KEY, &new_token).await?,
    };
    Ok(Json(json!({ "token": new_token, "version": version })))
}
