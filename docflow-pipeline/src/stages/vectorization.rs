//! ABOUTME: Vectorization Stage (C12): batch-embeds question text, non-fatal on failure

use crate::store::QuestionStore;
use docflow_core::{build_question_text, PipelineState, QuestionId};
use docflow_embeddings::EmbeddingProvider;
use std::sync::Arc;

/// Never aborts the pipeline (§4.12 rule 4): any failure is recorded on
/// `state.metadata` as `vectorization_error` and `vector_ids` stays empty.
#[tracing::instrument(skip_all, fields(job_id = %state.job_id))]
pub async fn run(
    state: &mut PipelineState,
    embedder: &Arc<dyn EmbeddingProvider>,
    question_store: &Arc<dyn QuestionStore>,
) -> Vec<QuestionId> {
    if state.question_ids.is_empty() {
        return Vec::new();
    }

    let questions = match question_store.get_many(&state.question_ids).await {
        Ok(q) => q,
        Err(err) => {
            state.record_metadata("vectorization_error", err.to_string());
            return Vec::new();
        }
    };

    let texts: Vec<String> = questions.iter().map(build_question_text).collect();

    let vectors = match embedder.embed_texts(&texts).await {
        Ok(v) => v,
        Err(err) => {
            state.record_metadata("vectorization_error", err.to_string());
            return Vec::new();
        }
    };

    if vectors.len() != questions.len() {
        state.record_metadata(
            "vectorization_error",
            "embedding provider returned a mismatched vector count",
        );
        return Vec::new();
    }

    let pairs: Vec<(QuestionId, Vec<f32>)> = questions
        .iter()
        .map(|q| q.id)
        .zip(vectors)
        .collect();
    let ids: Vec<QuestionId> = pairs.iter().map(|(id, _)| *id).collect();

    if let Err(err) = question_store.apply_embeddings(pairs).await {
        state.record_metadata("vectorization_error", err.to_string());
        return Vec::new();
    }

    ids
}
