//! Typed, immutable process configuration built once at startup from the
//! environment variables enumerated in the system's external-interfaces spec.
//!
//! Built with a pure function (`Config::from_env`) rather than a mutable
//! global: callers build one `Config`, wrap it in an `Arc`, and pass it
//! explicitly. Per-agent / per-call overrides are produced by the pure
//! `RagSettings::merge` function below instead of mutating global state.

use serde::{Deserialize, Serialize};
use std::env;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Resolved retrieval configuration surface (spec §4.3 configuration table).
///
/// Every field has the documented default; `Config::from_env` seeds the
/// global defaults from `RAG_*` env vars, per-agent rows override via
/// `Agent::rag_settings`, and call-site overrides are the finest grain.
/// `merge` applies all three in that order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RagSettings {
    pub final_k: usize,
    pub k_dense_each: usize,
    pub k_dense_fuse: usize,
    pub k_lex: usize,
    pub expansions: usize,
    pub mmr_lambda: f64,
    pub use_bm25: bool,
    pub keyword_prefilter: bool,
    pub llm_rerank: bool,
    pub budget_ms: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            final_k: 6,
            k_dense_each: 8,
            k_dense_fuse: 10,
            k_lex: 12,
            expansions: 2,
            mmr_lambda: 0.7,
            use_bm25: true,
            keyword_prefilter: true,
            llm_rerank: false,
            budget_ms: 8000,
        }
    }
}

/// Sparse per-call overrides; `None` fields fall through to the agent/global value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RagOverrides {
    pub final_k: Option<usize>,
    pub k_dense_each: Option<usize>,
    pub k_dense_fuse: Option<usize>,
    pub k_lex: Option<usize>,
    pub expansions: Option<usize>,
    pub mmr_lambda: Option<f64>,
    pub use_bm25: Option<bool>,
    pub keyword_prefilter: Option<bool>,
    pub llm_rerank: Option<bool>,
    pub budget_ms: Option<u64>,
}

impl RagSettings {
    /// Pure merge: `global` defaults, overridden field-by-field by `agent`
    /// (an agent's stored `rag_settings`, itself a `RagOverrides`), overridden
    /// field-by-field by `call` (request-scoped overrides). No mutation of
    /// either input.
    pub fn merge(global: RagSettings, agent: RagOverrides, call: RagOverrides) -> RagSettings {
        let mid = Self::apply(global, agent);
        Self::apply(mid, call)
    }

    fn apply(base: RagSettings, over: RagOverrides) -> RagSettings {
        RagSettings {
            final_k: over.final_k.unwrap_or(base.final_k),
            k_dense_each: over.k_dense_each.unwrap_or(base.k_dense_each),
            k_dense_fuse: over.k_dense_fuse.unwrap_or(base.k_dense_fuse),
            k_lex: over.k_lex.unwrap_or(base.k_lex),
            expansions: over.expansions.unwrap_or(base.expansions),
            mmr_lambda: over.mmr_lambda.unwrap_or(base.mmr_lambda),
            use_bm25: over.use_bm25.unwrap_or(base.use_bm25),
            keyword_prefilter: over.keyword_prefilter.unwrap_or(base.keyword_prefilter),
            llm_rerank: over.llm_rerank.unwrap_or(base.llm_rerank),
            budget_ms: over.budget_ms.unwrap_or(base.budget_ms),
        }
    }
}

/// Immutable process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub pg_schema: String,
    pub pg_table: String,
    pub pg_embed_col: String,
    pub embed_dim: usize,
    pub embed_model: String,
    pub openai_model: String,
    pub rerank_model: String,
    pub rag_defaults: RagSettings,
    pub rag_corpus_limit: usize,
    pub rag_bm25_ttl_sec: u64,
    pub rag_boost_domain: Option<String>,
    pub singleshot_budget_ms: u64,
    pub stream_budget_ms: u64,
    pub strict_context_only: bool,
    pub api_token: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Builds configuration from the current process environment. Does not
    /// read `.env`/XDG files itself — call [`crate::load_and_apply`] first if
    /// those should seed the environment.
    pub fn from_env() -> Self {
        let rag_defaults = RagSettings {
            final_k: env_usize("RAG_TOP_K", RagSettings::default().final_k),
            k_dense_each: env_usize("RAG_K_DENSE_EACH", RagSettings::default().k_dense_each),
            k_dense_fuse: env_usize("RAG_K_DENSE_FUSE", RagSettings::default().k_dense_fuse),
            k_lex: env_usize("RAG_K_LEX", RagSettings::default().k_lex),
            expansions: env_usize("RAG_EXPANSIONS", RagSettings::default().expansions),
            mmr_lambda: env_f64("RAG_MMR_LAMBDA", RagSettings::default().mmr_lambda),
            use_bm25: env_bool("RAG_USE_BM25", RagSettings::default().use_bm25),
            keyword_prefilter: env_bool(
                "RAG_KEYWORD_PREFILTER",
                RagSettings::default().keyword_prefilter,
            ),
            llm_rerank: env_bool("RAG_LLM_RERANK", RagSettings::default().llm_rerank),
            budget_ms: env_u64("SINGLESHOT_BUDGET_MS", RagSettings::default().budget_ms),
        };

        Config {
            database_url: env_string("DATABASE_URL", "postgres://localhost/gasable"),
            pg_schema: env_string("PG_SCHEMA", "public"),
            pg_table: env_string("PG_TABLE", "gasable_index"),
            pg_embed_col: env_string("PG_EMBED_COL", "embedding"),
            embed_dim: env_usize("EMBED_DIM", 1536),
            embed_model: env_string("EMBED_MODEL", "text-embedding-3-small"),
            openai_model: env_string("OPENAI_MODEL", "gpt-4o-mini"),
            rerank_model: env_string("RERANK_MODEL", "gpt-4o-mini"),
            rag_corpus_limit: env_usize("RAG_CORPUS_LIMIT", 20_000),
            rag_bm25_ttl_sec: env_u64("RAG_BM25_TTL_SEC", 300),
            rag_boost_domain: env_opt_string("RAG_BOOST_DOMAIN"),
            singleshot_budget_ms: env_u64("SINGLESHOT_BUDGET_MS", 8000),
            stream_budget_ms: env_u64("STREAM_BUDGET_MS", 30_000),
            strict_context_only: env_bool("STRICT_CONTEXT_ONLY", false),
            api_token: env_opt_string("API_TOKEN"),
            cors_origins: env_opt_string("CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            rag_defaults,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_call_over_agent_over_global() {
        let global = RagSettings::default();
        let agent = RagOverrides {
            final_k: Some(10),
            mmr_lambda: Some(0.3),
            ..Default::default()
        };
        let call = RagOverrides {
            final_k: Some(3),
            ..Default::default()
        };
        let merged = RagSettings::merge(global, agent, call);
        assert_eq!(merged.final_k, 3);
        assert_eq!(merged.mmr_lambda, 0.3);
        assert_eq!(merged.k_lex, global.k_lex);
    }

    #[test]
    fn merge_with_no_overrides_is_global() {
        let global = RagSettings::default();
        let merged = RagSettings::merge(global, RagOverrides::default(), RagOverrides::default());
        assert_eq!(merged, global);
    }
}
