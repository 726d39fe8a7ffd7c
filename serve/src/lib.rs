//! HTTP + SSE server for the gasable hub (spec §6).
//!
//! Listens on `127.0.0.1:8080` by default, serving the REST/SSE surface
//! over `AppState`'s `Store`/`Embedder`/`ChatClient`/`ToolRegistry`/
//! `Vault`. **Public API**: [`run_serve`], [`run_serve_on_listener`].

pub mod app;
mod error;
mod routes;
mod sse;

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::Client as OpenAiRawClient;
use config::Config;
use gasable_core::llm::{OpenAiChatClient, OpenAiEmbedder};
use gasable_core::store::PgStore;
use gasable_core::tools::{GmailSendTool, HttpFetchTool, OrdersPlaceTool, RetrievalSearchTool, ToolRegistry};
use gasable_core::vault::Vault;
use tokio::net::TcpListener;
use tracing::info;

use app::{router, AppState};

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";

fn openai_client() -> OpenAiRawClient<OpenAIConfig> {
    let mut cfg = OpenAIConfig::new();
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        cfg = cfg.with_api_key(key);
    }
    if let Ok(base) = std::env::var("OPENAI_API_BASE") {
        cfg = cfg.with_api_base(base);
    }
    OpenAiRawClient::with_config(cfg)
}

fn build_registry(state_deps: &AppState) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(HttpFetchTool::new()));
    registry.register(Arc::new(GmailSendTool::new()));
    registry.register(Arc::new(OrdersPlaceTool::new()));
    registry.register(Arc::new(RetrievalSearchTool::new(
        state_deps.store.clone(),
        state_deps.embedder.clone(),
        Some(state_deps.chat.clone()),
        state_deps.config.embed_model.clone(),
        state_deps.config.rerank_model.clone(),
        state_deps.config.rag_boost_domain.clone(),
    )));
    registry
}

/// Builds `AppState` from the environment: connects the Postgres-backed
/// `Store`, wraps `async-openai` in the chat/embedder clients, registers
/// built-in tools, and opens the Vault with `VAULT_MASTER_KEY`.
async fn app_state_from_env() -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let config = Arc::new(Config::from_env());

    let store = Arc::new(
        PgStore::connect(&config.database_url, &config.pg_schema, &config.pg_table, &config.pg_embed_col).await?,
    );
    store.migrate(config.embed_dim).await?;
    let store: std::sync::Arc<dyn gasable_core::store::Store> = store;

    let client = openai_client();
    let embedder: Arc<dyn gasable_core::llm::Embedder> = Arc::new(OpenAiEmbedder::new(client.clone()));
    let chat: Arc<dyn gasable_core::llm::ChatClient> = Arc::new(OpenAiChatClient::new(client));

    let master_key = std::env::var("VAULT_MASTER_KEY").unwrap_or_default();
    let vault = Arc::new(Vault::from_base64_key(store.clone(), &master_key)?);

    let partial = AppState {
        store,
        embedder,
        chat,
        registry: Arc::new(ToolRegistry::new()),
        vault,
        config,
    };
    let registry = Arc::new(build_registry(&partial));

    Ok(Arc::new(AppState { registry, ..partial }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Runs the server on an existing listener (used by tests: bind to
/// `127.0.0.1:0`, then pass the listener in).
pub async fn run_serve_on_listener(listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("HTTP server listening on http://{}", addr);

    let state = app_state_from_env().await?;
    let app = router(state);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

/// Runs the server, binding `addr` (default `127.0.0.1:8080`).
pub async fn run_serve(addr: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_HTTP_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener).await
}
