//! ABOUTME: LLM Gateway (C7): thin facade over multiple model providers, selected by name

use async_trait::async_trait;
use docflow_core::PipelineError;
use docflow_resilience::{retry_default, CircuitBreaker, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

/// §4.7: retry 2 times with backoff on transient errors.
pub fn llm_retry_config() -> RetryConfig {
    RetryConfig::new(2, Duration::from_secs(1), 2.0)
}

/// Capability boundary for a single model invocation. One variant per
/// provider, selected by model name from a closed set — the gateway never
/// reflects on provider internals, matching the teacher's
/// `ProviderInstance` shape reduced to the one operation this pipeline
/// needs.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, PipelineError>;

    fn provider_name(&self) -> &str;
}

/// Production provider calling a hosted chat-completion-style HTTP API,
/// with an optional circuit breaker keyed by provider name (§4.1, §8
/// scenario 6).
pub struct HttpLlmProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl HttpLlmProvider {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            breaker: None,
        }
    }

    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    fn check_breaker(&self) -> Result<(), PipelineError> {
        if let Some(breaker) = &self.breaker {
            breaker
                .check()
                .map_err(|retry_after| PipelineError::CircuitOpen {
                    service: breaker.service_name().to_string(),
                    retry_after,
                })?;
        }
        Ok(())
    }

    fn record_outcome(&self, result: &Result<String, PipelineError>) {
        let Some(breaker) = &self.breaker else {
            return;
        };
        match result {
            Ok(_) => breaker.record_success(),
            Err(e) if e.is_retryable() => breaker.record_failure(),
            Err(_) => {}
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, PipelineError> {
        #[derive(serde::Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
        }
        #[derive(serde::Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }
        #[derive(serde::Deserialize)]
        struct ResponseMessage {
            content: String,
        }
        #[derive(serde::Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        let mut request = self.http.post(&self.endpoint).json(&Request {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                PipelineError::Transient {
                    service: format!("llm:{}", self.model),
                    message: e.to_string(),
                }
            } else {
                PipelineError::general(format!("llm request failed: {e}"))
            }
        })?;

        if response.status().is_server_error() {
            return Err(PipelineError::Transient {
                service: format!("llm:{}", self.model),
                message: format!("status {}", response.status()),
            });
        }
        if !response.status().is_success() {
            return Err(PipelineError::general(format!(
                "llm provider returned status {}",
                response.status()
            )));
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|e| PipelineError::general(format!("invalid llm response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::general("llm response had no choices"))
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn invoke(&self, prompt: &str) -> Result<String, PipelineError> {
        self.check_breaker()?;
        let retry_config = llm_retry_config();
        let result = retry_default("llm.invoke", retry_config, || self.call(prompt)).await;
        self.record_outcome(&result);
        result
    }

    fn provider_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_resilience::BreakerConfig;

    #[tokio::test]
    async fn open_circuit_rejects_invoke_before_any_network_call() {
        let breaker = Arc::new(CircuitBreaker::new(
            "llm:test-model",
            BreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(600),
            },
        ));
        breaker.record_failure();

        let provider = HttpLlmProvider::new("http://localhost:1/v1/chat", "test-model", None)
            .with_circuit_breaker(breaker);

        let result = provider.invoke("hello").await;
        assert!(matches!(result, Err(PipelineError::CircuitOpen { .. })));
    }

    #[test]
    fn provider_name_reports_configured_model() {
        let provider = HttpLlmProvider::new("http://localhost", "gpt-test", None);
        assert_eq!(provider.provider_name(), "gpt-test");
    }
}
