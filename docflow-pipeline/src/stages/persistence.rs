//! ABOUTME: Persistence Stage (C10): image upload, Markdown rewrite, question extraction, commit

use crate::store::{DocumentStore, PersistenceError, QuestionStore};
use docflow_core::{
    Document, PipelineError, PipelineState, PromptTemplateRegistry, Question, QuestionKind,
};
use docflow_llm::{parse_llm_json, LlmProvider};
use docflow_objectstore::ObjectStore;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Arc;

const MARKDOWN_TRUNCATION_LIMIT: usize = 25_000;
const TRUNCATION_MARKER: &str = "\n... [truncated]";

fn read_raw_markdown(zip_path: &std::path::Path) -> Result<String, String> {
    let file = std::fs::File::open(zip_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        if entry.name().ends_with(".md") {
            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| e.to_string())?;
            return Ok(content);
        }
    }
    Ok(String::new())
}

/// Rewrites every local image reference to its uploaded public URL,
/// longest-ref-first so a ref that's a prefix of another doesn't get
/// partially clobbered (§4.10 rule 2).
fn rewrite_image_references(markdown: &str, url_map: &HashMap<String, String>) -> String {
    let mut refs: Vec<&String> = url_map.keys().collect();
    refs.sort_by_key(|r| std::cmp::Reverse(r.len()));

    let mut result = markdown.to_string();
    for local_ref in refs {
        let public_url = &url_map[local_ref];
        result = result.replace(&format!("]({local_ref})"), &format!("]({public_url})"));
        result = result.replace(&format!("src=\"{local_ref}\""), &format!("src=\"{public_url}\""));
        result = result.replace(&format!("src='{local_ref}'"), &format!("src='{public_url}'"));
    }
    result
}

fn truncate(markdown: &str) -> String {
    if markdown.chars().count() <= MARKDOWN_TRUNCATION_LIMIT {
        return markdown.to_string();
    }
    let truncated: String = markdown.chars().take(MARKDOWN_TRUNCATION_LIMIT).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

struct ExtractedQuestion {
    question_number: Option<u64>,
    question_text: String,
    question_type: QuestionKind,
    options: BTreeMap<String, String>,
    image_urls: Vec<String>,
}

fn parse_question_kind(s: &str) -> Option<QuestionKind> {
    match s {
        "multiple_choice" => Some(QuestionKind::MultipleChoice),
        "open_ended" => Some(QuestionKind::OpenEnded),
        "true_false" => Some(QuestionKind::TrueFalse),
        "fill_in_blank" => Some(QuestionKind::FillInBlank),
        _ => None,
    }
}

/// Drops entries not conforming to the expected shape (§4.10 rule 4)
/// rather than failing the whole batch on one bad element.
fn extract_questions(value: &serde_json::Value) -> Vec<ExtractedQuestion> {
    let Some(array) = value.as_array() else {
        return Vec::new();
    };

    array
        .iter()
        .filter_map(|entry| {
            let question_text = entry.get("question_text")?.as_str()?.to_string();
            let question_type = entry
                .get("question_type")
                .and_then(serde_json::Value::as_str)
                .and_then(parse_question_kind)
                .unwrap_or(QuestionKind::OpenEnded);
            let question_number = entry.get("question_number").and_then(serde_json::Value::as_u64);
            let options = entry
                .get("options")
                .and_then(serde_json::Value::as_object)
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let image_urls = entry
                .get("image_urls")
                .and_then(serde_json::Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(ToString::to_string))
                        .collect()
                })
                .unwrap_or_default();

            Some(ExtractedQuestion {
                question_number,
                question_text,
                question_type,
                options,
                image_urls,
            })
        })
        .collect()
}

/// On any failure, the caller is expected to treat this as a hard pipeline
/// abort (§4.10, §7: "Persistence failures abort the job").
#[tracing::instrument(skip_all, fields(job_id = %state.job_id))]
pub async fn run(
    state: &mut PipelineState,
    object_store: &Arc<dyn ObjectStore>,
    llm: &Arc<dyn LlmProvider>,
    templates: &PromptTemplateRegistry,
    document_store: &Arc<dyn DocumentStore>,
    question_store: &Arc<dyn QuestionStore>,
) -> Result<(), PipelineError> {
    let zip_path = state.output_zip_path.clone().ok_or_else(|| {
        PipelineError::general("persistence stage requires output_zip_path")
    })?;

    let raw_markdown = state.raw_markdown.clone().unwrap_or(
        read_raw_markdown(&zip_path)
            .map_err(|e| PipelineError::general(format!("failed to read zip markdown: {e}")))?,
    );

    let image_map = object_store
        .upload_images_from_zip(&zip_path, &state.user_id, &state.job_id.to_string())
        .await?;
    state.image_url_map = image_map.clone();

    let rewritten_markdown = rewrite_image_references(&raw_markdown, &image_map);
    state.rewritten_markdown = Some(rewritten_markdown.clone());

    let template = templates
        .get("question_extraction")
        .ok_or_else(|| PipelineError::general("missing question_extraction template"))?;
    let mut vars = HashMap::new();
    vars.insert("markdown_content".to_string(), truncate(&rewritten_markdown));
    let prompt = template.render(&vars);

    let response = llm.invoke(&prompt).await?;
    let parsed = parse_llm_json(&response)
        .ok_or_else(|| PipelineError::general("could not parse question extraction response"))?;
    let extracted = extract_questions(&parsed);

    let document = Document {
        id: docflow_core::DocumentId::new(),
        user_id: state.user_id.clone(),
        original_filename: state
            .filename
            .clone()
            .unwrap_or_else(|| state.source_ref.clone()),
        source_ref: state.source_ref.clone(),
        job_id: state.job_id,
        raw_markdown,
        cleaned_markdown: None,
        rewritten_markdown,
        kind: state.kind,
        question_count: u32::try_from(extracted.len()).unwrap_or(u32::MAX),
    };
    let document_id = document.id;

    let questions: Vec<Question> = extracted
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let ordinal = q.question_number.unwrap_or(i as u64 + 1) as u32;
            let mut question = Question::new(
                &state.user_id,
                document_id,
                ordinal,
                q.question_text,
                q.question_type,
                q.options,
            );
            question.image_refs = q.image_urls;
            question
        })
        .collect();

    let tx = document_store
        .begin_transaction()
        .await
        .map_err(persistence_error)?;

    if let Err(e) = document_store.insert_in_tx(&tx, document).await {
        tx.rollback().await;
        return Err(persistence_error(e));
    }

    let question_ids = match question_store.insert_many_in_tx(&tx, questions).await {
        Ok(ids) => ids,
        Err(e) => {
            tx.rollback().await;
            return Err(persistence_error(e));
        }
    };

    tx.commit().await.map_err(persistence_error)?;

    state.document_id = Some(document_id);
    state.question_ids = question_ids;

    Ok(())
}

fn persistence_error(err: PersistenceError) -> PipelineError {
    PipelineError::storage_with_source(err.to_string(), err)
}
