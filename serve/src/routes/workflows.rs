//! `GET/POST /api/workflows`, `GET /api/workflows/{id}`, `POST
//! /api/workflows/{id}/run` (spec §6, §4.7).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use gasable_core::model::Workflow;
use gasable_core::retriever::NoopReporter;
use gasable_core::workflow;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub namespace: Option<String>,
}

pub async fn list(State(state): State<Arc<AppState>>, Query(params): Query<ListParams>) -> Result<Json<Vec<Workflow>>, ApiError> {
    let namespace = params.namespace.unwrap_or_else(|| "global".to_string());
    Ok(Json(state.store.list_workflows(&namespace).await?))
}

pub async fn create(State(state): State<Arc<AppState>>, Json(body): Json<Workflow>) -> Result<Json<Workflow>, ApiError> {
    state.store.upsert_workflow(&body).await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    pub enrich: Option<bool>,
}

/// `enrich=true` resolves each tool/agent node's declared name against the
/// Tool Registry so a caller can display descriptions without a second
/// round trip per node.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<GetParams>,
) -> Result<Json<Value>, ApiError> {
    let wf = state.store.get_workflow(&id).await?;
    if !params.enrich.unwrap_or(false) {
        return Ok(Json(serde_json::to_value(&wf).unwrap_or(Value::Null)));
    }

    let mut nodes = Vec::new();
    for node in &wf.graph.nodes {
        let resolved = node.resolved_name().and_then(|name| state.registry.get(&name).ok());
        nodes.push(json!({
            "id": node.id,
            "type": node.raw_type,
            "resolved_tool": resolved.map(|t| t.spec().clone()),
        }));
    }

    Ok(Json(json!({ "workflow": wf, "nodes": nodes })))
}

#[derive(Debug, Deserialize, Default)]
pub struct RunBody {
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Value>, ApiError> {
    let wf = state.store.get_workflow(&id).await?;
    let body: RunBody = if body.is_empty() {
        RunBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| gasable_core::GasableError::BadRequest(e.to_string()))?
    };

    let result = workflow::run_workflow(
        state.registry.as_ref(),
        state.vault.as_ref(),
        &wf,
        &wf.id,
        body.user_id.as_deref(),
        &NoopReporter,
    )
    .await?;

    Ok(Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}
