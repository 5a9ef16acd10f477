//! ABOUTME: Embedding Provider (C6): text-to-vector conversion, single and batch

use async_trait::async_trait;
use docflow_core::PipelineError;
use docflow_resilience::{retry_default, RetryConfig};
use std::time::Duration;

/// §4.6: both single and batch embedding calls share this retry policy.
pub fn embedding_retry_config() -> RetryConfig {
    RetryConfig::new(2, Duration::from_secs_f64(1.0), 2.0)
}

/// Capability boundary for turning text into fixed-dimension vectors. One
/// concrete variant per provider (local model, hosted API), selected by
/// model name from a closed set — the same provider-as-capability shape
/// the teacher uses for `EmbeddingProvider`/`EmbeddingModel`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single string.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, PipelineError>;

    /// Embeds a batch; `[]` in, `[]` out, no network call made.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Native dimension of vectors this provider produces. Must match the
    /// configured model dimension (§6 invariant on `Question.embedding`).
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Deterministic, network-free embedding provider used by tests and local
/// development: hashes each input into a stable pseudo-random unit vector
/// of the configured dimension. Never produces the same vector for two
/// different strings (collisions aside) and is stable across calls.
pub struct LocalHashEmbeddingProvider {
    model_name: String,
    dimensions: usize,
}

impl LocalHashEmbeddingProvider {
    #[must_use]
    pub fn new(model_name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimensions,
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf29ce484222325;
        let mut vector = Vec::with_capacity(self.dimensions);
        for (i, byte) in text.bytes().enumerate() {
            state ^= u64::from(byte) ^ (i as u64);
            state = state.wrapping_mul(0x100000001b3);
        }
        for i in 0..self.dimensions {
            state ^= i as u64;
            state = state.wrapping_mul(0x100000001b3);
            let normalized = (state % 2000) as f32 / 1000.0 - 1.0;
            vector.push(normalized);
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for LocalHashEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let retry_config = embedding_retry_config();
        retry_default("embeddings.embed_text", retry_config, || async {
            Ok(self.hash_to_vector(text))
        })
        .await
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let retry_config = embedding_retry_config();
        retry_default("embeddings.embed_texts", retry_config, || async {
            Ok(texts.iter().map(|t| self.hash_to_vector(t)).collect())
        })
        .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Production provider calling a hosted embedding API over HTTP. Response
/// shape mirrors the common `{"data": [{"embedding": [...]}]}` envelope
/// used by hosted embedding APIs.
pub struct HttpEmbeddingProvider {
    http: reqwest::Client,
    endpoint: String,
    model_name: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model_name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model_name: model_name.into(),
            dimensions,
        }
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        #[derive(serde::Serialize)]
        struct Request<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct Embedding {
            embedding: Vec<f32>,
        }
        #[derive(serde::Deserialize)]
        struct Response {
            data: Vec<Embedding>,
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&Request {
                model: &self.model_name,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PipelineError::Transient {
                        service: "embedding_provider".to_string(),
                        message: e.to_string(),
                    }
                } else {
                    PipelineError::general(format!("embedding request failed: {e}"))
                }
            })?;

        if response.status().is_server_error() {
            return Err(PipelineError::Transient {
                service: "embedding_provider".to_string(),
                message: format!("status {}", response.status()),
            });
        }
        if !response.status().is_success() {
            return Err(PipelineError::general(format!(
                "embedding provider returned status {}",
                response.status()
            )));
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|e| PipelineError::general(format!("invalid embedding response: {e}")))?;

        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let retry_config = embedding_retry_config();
        let texts = vec![text.to_string()];
        let vectors = retry_default("embeddings.embed_text", retry_config, || async {
            self.call(&texts).await
        })
        .await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::general("embedding provider returned no vectors"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let retry_config = embedding_retry_config();
        retry_default("embeddings.embed_texts", retry_config, || async {
            self.call(texts).await
        })
        .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_text_produces_stable_dimension_vector() {
        let provider = LocalHashEmbeddingProvider::new("test-model", 384);
        let vector = provider.embed_text("hello world").await.unwrap();
        assert_eq!(vector.len(), 384);
    }

    #[tokio::test]
    async fn embed_text_is_deterministic_for_same_input() {
        let provider = LocalHashEmbeddingProvider::new("test-model", 16);
        let a = provider.embed_text("same input").await.unwrap();
        let b = provider.embed_text("same input").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embed_text_differs_for_different_input() {
        let provider = LocalHashEmbeddingProvider::new("test-model", 16);
        let a = provider.embed_text("alpha").await.unwrap();
        let b = provider.embed_text("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn embed_texts_on_empty_slice_returns_empty_without_calling_provider() {
        let provider = LocalHashEmbeddingProvider::new("test-model", 16);
        let result = provider.embed_texts(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn embed_texts_preserves_order_and_count() {
        let provider = LocalHashEmbeddingProvider::new("test-model", 8);
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let vectors = provider.embed_texts(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        for v in &vectors {
            assert_eq!(v.len(), 8);
        }
    }

    #[test]
    fn dimensions_and_model_name_are_reported() {
        let provider = LocalHashEmbeddingProvider::new("bge-small-en", 384);
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.model_name(), "bge-small-en");
    }
}
