//! `GET /health`, `GET /api/status` (spec §6, §4.9).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use gasable_core::status;
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = status::health(state.store.as_ref(), state.embedder.as_ref(), &state.config.embed_model).await;
    Json(json!({ "healthy": report.is_healthy(), "db": report.db, "embedder": report.embedder }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = status::health(state.store.as_ref(), state.embedder.as_ref(), &state.config.embed_model).await;
    let info = status::status(&state.config.pg_embed_col);
    Json(json!({
        "db": { "status": report.db.status },
        "embedding_col": info.embedding_col,
        "pid": info.pid,
        "schema_version": info.schema_version,
    }))
}
