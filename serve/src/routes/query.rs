//! `POST /api/query`, `GET /api/query_stream` (spec §6, §4.3, §4.4).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::Sse;
use axum::Json;
use gasable_core::model::DEFAULT_AGENT_ID;
use gasable_core::retriever::{self, NoopReporter, Selected, StepReporter};
use gasable_core::{answerer, GasableError};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::sse::sse_response;

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub q: String,
    pub k: Option<usize>,
    pub agent_id: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: String,
    pub k: Option<usize>,
    pub agent_id: Option<String>,
    pub namespace: Option<String>,
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn to_html(text: &str) -> String {
    text.lines().map(|line| format!("<p>{}</p>", escape_html(line))).collect::<Vec<_>>().join("\n")
}

async fn run_query(
    state: &AppState,
    q: &str,
    k: Option<usize>,
    agent_id: &str,
    namespace: &str,
    reporter: &dyn StepReporter,
) -> Result<Value, GasableError> {
    let mut cfg = state.config.rag_defaults;
    if let Some(k) = k {
        cfg.final_k = k;
    }

    let result = retriever::retrieve(
        state.store.as_ref(),
        state.embedder.as_ref(),
        Some(state.chat.as_ref()),
        &state.config.embed_model,
        &state.config.rerank_model,
        q,
        agent_id,
        namespace,
        cfg,
        state.config.rag_boost_domain.as_deref(),
        reporter,
    )
    .await?;

    let hits: &[Selected] = &result.selected;
    let structured = answerer::answer(
        Some(state.chat.as_ref()),
        &state.config.openai_model,
        q,
        hits,
        result.language,
        state.config.strict_context_only,
        state.config.singleshot_budget_ms,
        reporter,
    )
    .await?;

    let answer_text = answerer::format(&structured);
    let context_ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();

    Ok(json!({
        "answer": answer_text,
        "answer_html": to_html(&answer_text),
        "context_ids": context_ids,
        "structured": structured,
        "structured_html": to_html(&answer_text),
        "meta": {
            "expansions": result.expansions,
            "fused": result.fused,
            "budget_hit": result.budget_hit,
            "elapsed_ms": result.elapsed_ms,
            "language": result.language,
        },
    }))
}

pub async fn query(State(state): State<Arc<AppState>>, Json(body): Json<QueryBody>) -> Result<Json<Value>, ApiError> {
    let agent_id = body.agent_id.as_deref().unwrap_or(DEFAULT_AGENT_ID);
    let namespace = body.namespace.as_deref().unwrap_or("global");
    let value = run_query(&state, &body.q, body.k, agent_id, namespace, &NoopReporter).await?;
    Ok(Json(value))
}

pub async fn query_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
    sse_response(move |reporter| async move {
        let agent_id = params.agent_id.unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());
        let namespace = params.namespace.unwrap_or_else(|| "global".to_string());
        match run_query(&state, &params.q, params.k, &agent_id, &namespace, reporter.as_ref()).await {
            Ok(value) => value,
            Err(e) => json!({ "error": e.to_string() }),
        }
    })
}
