//! Axum app: shared state and router assembly.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use config::Config;
use gasable_core::llm::{ChatClient, Embedder};
use gasable_core::store::Store;
use gasable_core::tools::ToolRegistry;
use gasable_core::vault::Vault;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;

/// Everything a handler needs to serve a request, grounded on the
/// teacher's `AppState` (one struct, handed to the router behind an `Arc`,
/// no hidden global state).
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatClient>,
    pub registry: Arc<ToolRegistry>,
    pub vault: Arc<Vault>,
    pub config: Arc<Config>,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::new().allow_origin(AllowOrigin::any())
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(routes::status::health))
        .route("/api/status", get(routes::status::status))
        .route("/api/query", post(routes::query::query))
        .route("/api/query_stream", get(routes::query::query_stream))
        .route("/api/orchestrate", post(routes::orchestrate::orchestrate))
        .route("/api/orchestrate_stream", get(routes::orchestrate::orchestrate_stream))
        .route("/api/agents", get(routes::agents::list).post(routes::agents::create))
        .route("/api/agents/:id/rotate_key", post(routes::agents::rotate_key))
        .route("/api/mcp_tools", get(routes::tools::list).post(routes::tools::register))
        .route("/api/mcp_invoke", post(routes::tools::invoke))
        .route("/api/workflows", get(routes::workflows::list).post(routes::workflows::create))
        .route("/api/workflows/:id", get(routes::workflows::get))
        .route("/api/workflows/:id/run", post(routes::workflows::run))
        .route("/api/nodes", get(routes::nodes::list))
        .route("/api/nodes/install", post(routes::nodes::install))
        .route("/api/nodes/run", post(routes::nodes::run))
        .route("/api/keys", get(routes::keys::list))
        .route("/api/keys/mcp_token/rotate", post(routes::keys::rotate_mcp_token))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
