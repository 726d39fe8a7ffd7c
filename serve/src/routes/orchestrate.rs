//! `POST /api/orchestrate`, `GET /api/orchestrate_stream` (spec §6, §4.6).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::Sse;
use axum::Json;
use gasable_core::orchestrator::{self, OrchestrateRequest};
use gasable_core::retriever::{NoopReporter, StepReporter};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::sse::sse_response;

#[derive(Debug, Deserialize)]
pub struct OrchestrateBody {
    pub user_id: String,
    pub message: String,
    pub namespace: Option<String>,
    pub agent_preference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrchestrateParams {
    pub user_id: String,
    pub message: String,
    pub namespace: Option<String>,
    pub agent_preference: Option<String>,
}

async fn run(state: &AppState, request: OrchestrateRequest, reporter: &dyn StepReporter) -> Value {
    match orchestrator::orchestrate(
        state.store.as_ref(),
        state.chat.as_ref(),
        state.registry.as_ref(),
        state.vault.as_ref(),
        &state.config.openai_model,
        &request,
        reporter,
    )
    .await
    {
        Ok(result) => serde_json::to_value(result).unwrap_or(Value::Null),
        Err(e) => json!({ "status": "error", "error_kind": e.kind(), "message": e.to_string() }),
    }
}

pub async fn orchestrate(State(state): State<Arc<AppState>>, Json(body): Json<OrchestrateBody>) -> Json<Value> {
    let mut request = OrchestrateRequest::new(body.user_id, body.message, body.namespace.unwrap_or_else(|| "global".to_string()));
    request.agent_preference = body.agent_preference;
    let value = run(&state, request, &NoopReporter).await;
    Json(value)
}

pub async fn orchestrate_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OrchestrateParams>,
) -> Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    sse_response(move |reporter| async move {
        let mut request =
            OrchestrateRequest::new(params.user_id, params.message, params.namespace.unwrap_or_else(|| "global".to_string()));
        request.agent_preference = params.agent_preference;
        run(&state, request, reporter.as_ref()).await
    })
}
