//! C2 (embedding half): `embed(texts[]) -> vec[]`, deterministic for
//! identical input (spec §4.2). `OpenAiEmbedder` wraps `async-openai`'s
//! embeddings endpoint behind the teacher's cache-first pattern
//! (`cache::InMemoryCache`, grounded on the teacher's `cache` module).

use super::retry::{is_transient, retry_with_backoff};
use crate::cache::{Cache, InMemoryCache};
use crate::error::{GasableError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    cache: InMemoryCache<(String, String), Vec<f32>>,
    retry_deadline: Duration,
}

impl OpenAiEmbedder {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self {
            client,
            cache: InMemoryCache::new(),
            retry_deadline: Duration::from_secs(10),
        }
    }

    pub fn with_retry_deadline(mut self, deadline: Duration) -> Self {
        self.retry_deadline = deadline;
        self
    }

    async fn embed_one(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let key = (model.to_string(), text.to_string());
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }
        let model = model.to_string();
        let text = text.to_string();
        let vector = retry_with_backoff(self.retry_deadline, is_transient, || {
            let model = model.clone();
            let text = text.clone();
            async move {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model)
                    .input(EmbeddingInput::String(text))
                    .build()
                    .map_err(|e| GasableError::Internal(e.to_string()))?;
                let response = self.client.embeddings().create(request).await.map_err(map_openai_err)?;
                response
                    .data
                    .into_iter()
                    .next()
                    .map(|e| e.embedding)
                    .ok_or_else(|| GasableError::UpstreamUnavailable("empty embedding response".into()))
            }
        })
        .await?;
        self.cache.set(key, vector.clone(), Some(Duration::from_secs(600))).await;
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(model, text).await?);
        }
        Ok(out)
    }
}

/// Maps an `OpenAIError` to the shared taxonomy: rate limits and transport
/// failures are `UpstreamUnavailable` (retryable); anything else is
/// `Internal`.
fn map_openai_err(e: async_openai::error::OpenAIError) -> GasableError {
    use async_openai::error::OpenAIError;
    match e {
        OpenAIError::Reqwest(_) => GasableError::UpstreamUnavailable(e.to_string()),
        OpenAIError::ApiError(ref api) if api.code.as_deref() == Some("rate_limit_exceeded") => {
            GasableError::UpstreamUnavailable(e.to_string())
        }
        other => GasableError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn deterministic_for_identical_input() {
        let embedder = FixedEmbedder;
        let a = embedder.embed("m", &["hello".to_string()]).await.unwrap();
        let b = embedder.embed("m", &["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }
}
