//! C9: health checks, version/pid diagnostics, and the recent-error ring
//! read path (spec §4.9). The ring itself lives in `Store` (`record_error`/
//! `recent_errors`) so every component can append to it through the same
//! gateway the rest of the system already depends on.

use crate::error::ErrorKind;
use crate::llm::Embedder;
use crate::store::{ErrorEvent, Store};
use serde::Serialize;

/// Schema version this build expects `Store::migrate` to have applied.
/// Bumped by hand whenever a migration adds or changes a table — there is
/// no separate migrations-table/version-number mechanism (`migrate` is
/// idempotent `CREATE TABLE IF NOT EXISTS`, not a numbered migration chain).
pub const SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub error: Option<String>,
}

impl ComponentHealth {
    fn ok() -> Self {
        Self { status: "ok", error: None }
    }

    fn error(message: String) -> Self {
        Self { status: "error", error: Some(message) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub db: ComponentHealth,
    pub embedder: ComponentHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.db.status == "ok" && self.embedder.status == "ok"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub embedding_col: String,
    pub pid: u32,
    pub schema_version: &'static str,
}

/// Probes the Store with a cheap read and the Embedder with a 1-token
/// embed call; either failing degrades that component's status to
/// `"error"` without panicking the caller (spec §4.9: "probes ... with
/// small queries").
pub async fn health(store: &dyn Store, embedder: &dyn Embedder, embed_model: &str) -> HealthReport {
    let db = match store.recent_errors(1).await {
        Ok(_) => ComponentHealth::ok(),
        Err(e) => ComponentHealth::error(e.to_string()),
    };
    let embedder_health = match embedder.embed(embed_model, &["healthcheck".to_string()]).await {
        Ok(_) => ComponentHealth::ok(),
        Err(e) => ComponentHealth::error(e.to_string()),
    };
    HealthReport { db, embedder: embedder_health }
}

pub fn status(embedding_col: &str) -> StatusReport {
    StatusReport {
        embedding_col: embedding_col.to_string(),
        pid: std::process::id(),
        schema_version: SCHEMA_VERSION,
    }
}

/// `/api/recent_errors`: the last `n` structured error events, newest first.
pub async fn recent_errors(store: &dyn Store, n: usize) -> crate::error::Result<Vec<ErrorEvent>> {
    store.recent_errors(n).await
}

/// Appends a structured event to the ring, used by components that catch
/// an error but continue (the Retriever's sub-step degradation, the
/// Workflow Runtime's `continue` error policy).
pub async fn record_error(store: &dyn Store, kind: ErrorKind, message: &str) -> crate::error::Result<()> {
    store.record_error(kind, message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::store::MemStore;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _model: &str, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(crate::error::GasableError::UpstreamUnavailable("down".to_string()))
        }
    }

    struct OkEmbedder;

    #[async_trait]
    impl Embedder for OkEmbedder {
        async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    #[tokio::test]
    async fn healthy_when_both_components_respond() {
        let store = MemStore::default();
        let report = health(&store, &OkEmbedder, "m").await;
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn degrades_embedder_status_on_failure_without_panicking() {
        let store = MemStore::default();
        let report = health(&store, &FailingEmbedder, "m").await;
        assert!(!report.is_healthy());
        assert_eq!(report.embedder.status, "error");
        assert_eq!(report.db.status, "ok");
    }

    #[tokio::test]
    async fn recent_errors_reads_through_to_the_store() {
        let store = MemStore::default();
        record_error(&store, ErrorKind::Internal, "boom").await.unwrap();
        let events = recent_errors(&store, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "boom");
    }
}
