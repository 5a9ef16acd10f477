//! ABOUTME: Builds the Collaborators bundle (C13) from AppConfig, selecting HTTP-backed or
//! ABOUTME: in-memory implementations for every external-service trait per the --local flag

use docflow_config::{AppConfig, EmbeddingProviderKind};
use docflow_converter::HttpDocumentConverter;
use docflow_embeddings::{EmbeddingProvider, HttpEmbeddingProvider, LocalHashEmbeddingProvider};
use docflow_llm::{HttpLlmProvider, LlmProvider};
use docflow_objectstore::{HttpObjectStore, InMemoryObjectStore, ObjectStore};
use docflow_pipeline::store::{DocumentStore, InMemoryDocumentStore, InMemoryQuestionStore, PostgresStore, QuestionStore};
use docflow_pipeline::Collaborators;
use docflow_registry::{InMemoryJobStore, JobRegistry, PostgresJobStore};
use docflow_resilience::{BreakerConfig, CircuitBreakerRegistry};
use docflow_core::PromptTemplateRegistry;
use std::sync::Arc;
use std::time::Duration;

fn breaker_config(settings: docflow_config::CircuitBreakerSettings, service: &str) -> BreakerConfig {
    let per_service = match service {
        "converter" => settings.converter,
        "object_store" => settings.object_store,
        "llm" => settings.llm,
        "embedding" => settings.embedding,
        _ => unreachable!("unknown circuit-breaker service name {service}"),
    };
    BreakerConfig {
        failure_threshold: per_service.failure_threshold,
        recovery_timeout: Duration::from_secs(per_service.recovery_timeout_secs),
    }
}

/// Builds the full production `Collaborators` bundle against Postgres and
/// the converter/LLM/embedding HTTP backends named in config.
pub fn build_live(config: &AppConfig, pool: deadpool_postgres::Pool) -> Collaborators {
    let breakers = CircuitBreakerRegistry::new();

    let converter = Arc::new(HttpDocumentConverter::new(
        config.converter.url_mode_endpoint.clone(),
        config.converter.file_mode_endpoint.clone(),
        Duration::from_secs(config.converter.timeout_secs),
        config.converter.temp_dir.clone().into(),
        breakers.get_or_create("converter", breaker_config(config.circuit_breakers, "converter")),
    ));

    let object_store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
        format!("https://storage.googleapis.com/{}", config.object_store.bucket),
        format!("https://storage.googleapis.com/{}", config.object_store.bucket),
        Duration::from_secs(config.object_store.signed_url_expiration_secs),
        breakers.get_or_create("object_store", breaker_config(config.circuit_breakers, "object_store")),
    ));

    let llm: Arc<dyn LlmProvider> = Arc::new(
        HttpLlmProvider::new(
            std::env::var("DOCFLOW_LLM_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8089/v1/chat/completions".to_string()),
            config.validation.model_name.clone(),
            std::env::var("DOCFLOW_LLM_API_KEY").ok(),
        )
        .with_circuit_breaker(breakers.get_or_create("llm", breaker_config(config.circuit_breakers, "llm"))),
    );

    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.provider_kind {
        EmbeddingProviderKind::LocalModel => Arc::new(LocalHashEmbeddingProvider::new(
            config.embedding.model_name.clone(),
            config.embedding.dimension,
        )),
        EmbeddingProviderKind::ApiProvider => Arc::new(HttpEmbeddingProvider::new(
            std::env::var("DOCFLOW_EMBEDDING_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8090/v1/embeddings".to_string()),
            config.embedding.model_name.clone(),
            config.embedding.dimension,
        )),
    };

    let store = Arc::new(PostgresStore::new(pool.clone()));
    let document_store: Arc<dyn DocumentStore> = store.clone();
    let question_store: Arc<dyn QuestionStore> = store;
    let registry = Arc::new(JobRegistry::new(Arc::new(PostgresJobStore::new(pool))));

    Collaborators {
        converter,
        object_store,
        llm,
        embedder,
        document_store,
        question_store,
        registry,
        templates: Arc::new(PromptTemplateRegistry::with_defaults()),
        max_validation_attempts: config.validation.max_attempts,
    }
}

/// Builds a `Collaborators` bundle with every external service replaced by
/// its in-memory fake, for `--local` smoke runs with no network or database.
pub fn build_local(config: &AppConfig) -> Collaborators {
    let breakers = CircuitBreakerRegistry::new();

    let converter = Arc::new(HttpDocumentConverter::new(
        config.converter.url_mode_endpoint.clone(),
        config.converter.file_mode_endpoint.clone(),
        Duration::from_secs(config.converter.timeout_secs),
        config.converter.temp_dir.clone().into(),
        breakers.get_or_create("converter", BreakerConfig::default()),
    ));

    let object_store = Arc::new(InMemoryObjectStore::new(
        Duration::from_secs(config.object_store.signed_url_expiration_secs),
        "https://local.invalid",
    ));

    let llm = Arc::new(HttpLlmProvider::new(
        "http://localhost:8089/v1/chat/completions",
        config.validation.model_name.clone(),
        None,
    ));

    let embedder = Arc::new(LocalHashEmbeddingProvider::new(
        config.embedding.model_name.clone(),
        config.embedding.dimension,
    ));

    let document_store = Arc::new(InMemoryDocumentStore::new());
    let question_store = Arc::new(InMemoryQuestionStore::new());
    let registry = Arc::new(JobRegistry::new(Arc::new(InMemoryJobStore::new())));

    Collaborators {
        converter,
        object_store,
        llm,
        embedder,
        document_store,
        question_store,
        registry,
        templates: Arc::new(PromptTemplateRegistry::with_defaults()),
        max_validation_attempts: config.validation.max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_config_picks_the_named_service() {
        let mut settings = docflow_config::CircuitBreakerSettings::default();
        settings.llm.failure_threshold = 9;
        let config = breaker_config(settings, "llm");
        assert_eq!(config.failure_threshold, 9);
    }

    #[test]
    fn build_local_wires_every_collaborator() {
        let config = AppConfig::default();
        let collaborators = build_local(&config);
        assert_eq!(collaborators.max_validation_attempts, config.validation.max_attempts);
    }
}
