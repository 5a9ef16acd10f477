//! ABOUTME: Validation Stage (C9): scores a conversion and drives the retry-to-ingestion loop

use docflow_core::{ConverterOptionsOverride, PipelineState, PromptTemplateRegistry, ValidationFeedback};
use docflow_llm::{parse_llm_json, LlmProvider};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const MARKDOWN_TRUNCATION_LIMIT: usize = 15_000;
const TRUNCATION_MARKER: &str = "\n... [truncated]";

struct ZipContents {
    markdown: String,
    image_names: Vec<String>,
}

fn read_zip_contents(zip_path: &std::path::Path) -> Result<ZipContents, String> {
    let file = std::fs::File::open(zip_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;

    let mut markdown = None;
    let mut image_names = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let name = entry.name().to_string();
        if markdown.is_none() && name.ends_with(".md") {
            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| e.to_string())?;
            markdown = Some(content);
        } else if docflow_objectstore::is_image_path(&name) {
            image_names.push(name);
        }
    }

    Ok(ZipContents {
        markdown: markdown.unwrap_or_default(),
        image_names,
    })
}

fn truncate_markdown(markdown: &str) -> String {
    if markdown.chars().count() <= MARKDOWN_TRUNCATION_LIMIT {
        return markdown.to_string();
    }
    let truncated: String = markdown.chars().take(MARKDOWN_TRUNCATION_LIMIT).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

/// Runs one validation round: score the current conversion, then either
/// accept it, queue a re-parameterized retry, or force acceptance once
/// `max_attempts` is reached. Never returns an error — validator
/// unavailability degrades to "proceed anyway" per §4.9 rule 7.
#[tracing::instrument(skip(state, llm, templates), fields(job_id = %state.job_id))]
pub async fn run(
    state: &mut PipelineState,
    llm: &Arc<dyn LlmProvider>,
    templates: &PromptTemplateRegistry,
    max_attempts: u32,
) {
    let Some(zip_path) = state.output_zip_path.clone() else {
        force_pass(state, max_attempts);
        return;
    };

    let contents = match read_zip_contents(&zip_path) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read conversion zip; forcing validation pass");
            force_pass(state, max_attempts);
            return;
        }
    };
    state.raw_markdown = Some(contents.markdown.clone());

    let file_size = std::fs::metadata(&zip_path).map(|m| m.len()).unwrap_or(0);
    let file_type = state.kind.to_string();
    let source_filename = state
        .filename
        .clone()
        .unwrap_or_else(|| state.source_ref.clone());

    let Some(template) = templates.get("validation_scoring") else {
        force_pass(state, max_attempts);
        return;
    };

    let mut vars = HashMap::new();
    vars.insert("source_filename".to_string(), source_filename);
    vars.insert("file_type".to_string(), file_type);
    vars.insert("file_size".to_string(), file_size.to_string());
    vars.insert("image_list".to_string(), contents.image_names.join(", "));
    vars.insert(
        "markdown_content".to_string(),
        truncate_markdown(&contents.markdown),
    );
    let prompt = template.render(&vars);

    let response = match llm.invoke(&prompt).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "validation LLM call failed; forcing validation pass");
            force_pass(state, max_attempts);
            return;
        }
    };

    let Some(parsed) = parse_llm_json(&response) else {
        tracing::warn!("validation response could not be parsed; forcing validation pass");
        force_pass(state, max_attempts);
        return;
    };

    let score = parsed.get("score").and_then(serde_json::Value::as_u64).map(|s| s as u8);
    let issues: Vec<String> = parsed
        .get("issues")
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default();
    let recommendation = parsed
        .get("recommendation")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string);
    let passed = parsed
        .get("passed")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or_else(|| score.unwrap_or(0) >= 70);

    state.validation_feedback = ValidationFeedback {
        score,
        issues,
        recommendation,
    };
    state.validation_attempts += 1;

    if passed {
        state.validation_passed = true;
        cleanup_source(state);
        return;
    }

    if state.validation_attempts < max_attempts {
        let next_attempt = state.validation_attempts + 1;
        if let Some(overlay) = ConverterOptionsOverride::for_next_attempt(next_attempt) {
            state.docling_options = overlay.apply(state.docling_options.clone());
        }
        state.validation_passed = false;
    } else {
        state.validation_passed = true;
        state.record_metadata("max_attempts_reached", true);
        state.record_metadata("validation_score", score.unwrap_or(0));
        cleanup_source(state);
    }
}

fn force_pass(state: &mut PipelineState, max_attempts: u32) {
    state.validation_attempts = state.validation_attempts.max(max_attempts);
    state.validation_passed = true;
    cleanup_source(state);
}

fn cleanup_source(state: &mut PipelineState) {
    if let Some(path) = state.source_file_path.take() {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docflow_core::{JobId, PipelineError};

    struct FixedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn invoke(&self, _prompt: &str) -> Result<String, PipelineError> {
            Ok(self.response.clone())
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }
    }

    fn state_with_no_zip() -> PipelineState {
        PipelineState::new(JobId::new(), "user-1", "https://host/doc.pdf")
    }

    #[tokio::test]
    async fn missing_zip_forces_validation_pass() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm {
            response: String::new(),
        });
        let templates = PromptTemplateRegistry::with_defaults();
        let mut state = state_with_no_zip();

        run(&mut state, &llm, &templates, DEFAULT_MAX_ATTEMPTS).await;

        assert!(state.validation_passed);
    }

    #[tokio::test]
    async fn unparseable_llm_response_forces_pass_without_blocking() {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm {
            response: "I cannot help with that.".to_string(),
        });
        let templates = PromptTemplateRegistry::with_defaults();
        let mut state = state_with_no_zip();

        run(&mut state, &llm, &templates, DEFAULT_MAX_ATTEMPTS).await;

        assert!(state.validation_passed);
    }

    #[test]
    fn truncate_markdown_adds_marker_only_when_over_limit() {
        let short = "hello";
        assert_eq!(truncate_markdown(short), short);

        let long: String = "a".repeat(MARKDOWN_TRUNCATION_LIMIT + 10);
        let truncated = truncate_markdown(&long);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            truncated.chars().count(),
            MARKDOWN_TRUNCATION_LIMIT + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn force_pass_caps_attempts_and_clears_source_file() {
        let mut state = state_with_no_zip();
        state.source_file_path = Some(std::path::PathBuf::from("/tmp/nonexistent-for-test"));
        force_pass(&mut state, DEFAULT_MAX_ATTEMPTS);
        assert!(state.validation_passed);
        assert_eq!(state.validation_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(state.source_file_path.is_none());
    }
}
