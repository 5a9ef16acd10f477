//! ABOUTME: Orchestrator (C13): wires the six stages into the fixed retry-to-ingestion graph

use crate::stages::{classification, ingestion, persistence, validation, vectorization};
use crate::store::{DocumentStore, QuestionStore};
use docflow_converter::DocumentConverter;
use docflow_core::{JobId, JobStage, PipelineState, PromptTemplateRegistry};
use docflow_embeddings::EmbeddingProvider;
use docflow_llm::LlmProvider;
use docflow_objectstore::ObjectStore;
use docflow_registry::JobRegistry;
use std::sync::Arc;

/// Collaborator handles the orchestrator needs for one run. Each is a
/// `dyn` trait object so the same orchestrator runs against fakes in tests
/// and real network/database-backed implementations in production — §5's
/// "LLM and embedding clients may be shared across jobs" is satisfied by
/// `Arc` sharing these across concurrent workers.
#[derive(Clone)]
pub struct Collaborators {
    pub converter: Arc<dyn DocumentConverter>,
    pub object_store: Arc<dyn ObjectStore>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub document_store: Arc<dyn DocumentStore>,
    pub question_store: Arc<dyn QuestionStore>,
    pub registry: Arc<JobRegistry>,
    pub templates: Arc<PromptTemplateRegistry>,
    pub max_validation_attempts: u32,
}

/// Runs the full pipeline for one job to completion. Per §4.13, the
/// orchestrator invokes the Job Registry status update after every stage
/// transition, and the retry edge from Validation loops back to
/// Ingestion, never to Parsing.
///
/// Returns nothing — the Job Registry record is the durable outcome; a
/// caller that wants a synchronous result should poll the registry, not
/// this function's return value, matching the "fire-and-forget worker"
/// scheduling model of §4.13/§5.
#[tracing::instrument(skip(collaborators), fields(job_id = %job_id, %user_id))]
pub async fn run_job(
    job_id: JobId,
    user_id: &str,
    source_ref: &str,
    filename: Option<String>,
    collaborators: &Collaborators,
) {
    let mut state = PipelineState::new(job_id, user_id, source_ref);
    state.filename = filename;

    loop {
        collaborators
            .registry
            .update_status(job_id, JobStage::Ingesting, None)
            .await;

        if let Err(err) = ingestion::run(&mut state, &collaborators.converter).await {
            // `produced_no_content()` is always true here (conversion never
            // reached `Ok`), so the message leads with that and folds in the
            // error itself — a `CircuitOpen` err carries its retry-after
            // hint, an `UnknownKind` err names the bad reference (§8
            // scenarios 5 and 6 both read the durable `error_message`).
            collaborators
                .registry
                .fail(
                    job_id,
                    format!("No content extracted: {err}"),
                    state.metadata.clone(),
                )
                .await;
            return;
        }

        collaborators
            .registry
            .update_status(job_id, JobStage::Parsing, None)
            .await;

        collaborators
            .registry
            .update_status(job_id, JobStage::Validating, None)
            .await;
        validation::run(
            &mut state,
            &collaborators.llm,
            &collaborators.templates,
            collaborators.max_validation_attempts,
        )
        .await;

        if state.validation_passed {
            break;
        }
    }

    if state.produced_no_content() {
        collaborators
            .registry
            .fail(job_id, "No content extracted", state.metadata.clone())
            .await;
        return;
    }

    collaborators
        .registry
        .update_status(job_id, JobStage::Persisting, None)
        .await;
    if let Err(err) = persistence::run(
        &mut state,
        &collaborators.object_store,
        &collaborators.llm,
        &collaborators.templates,
        &collaborators.document_store,
        &collaborators.question_store,
    )
    .await
    {
        collaborators
            .registry
            .fail(job_id, err.to_string(), state.metadata.clone())
            .await;
        return;
    }

    collaborators
        .registry
        .update_status(job_id, JobStage::Classifying, None)
        .await;
    classification::run(
        &mut state,
        &collaborators.llm,
        &collaborators.templates,
        &collaborators.question_store,
    )
    .await;

    collaborators
        .registry
        .update_status(job_id, JobStage::Vectorizing, None)
        .await;
    vectorization::run(&mut state, &collaborators.embedder, &collaborators.question_store).await;

    let question_count = u32::try_from(state.question_ids.len()).unwrap_or(u32::MAX);
    collaborators
        .registry
        .complete(job_id, state.document_id, question_count, state.metadata.clone())
        .await;
}
