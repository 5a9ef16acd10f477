//! ABOUTME: Classification Stage (C11): batch LLM classification, non-fatal on failure

use crate::store::QuestionStore;
use docflow_core::{is_valid_topic, Classification, CognitiveLevel, Difficulty, PipelineState, PromptTemplateRegistry, QuestionId};
use docflow_llm::{parse_llm_json, LlmProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::str::FromStr;

const TEXT_TRUNCATION_LIMIT: usize = 1_000;

fn truncate(text: &str) -> String {
    if text.chars().count() <= TEXT_TRUNCATION_LIMIT {
        return text.to_string();
    }
    text.chars().take(TEXT_TRUNCATION_LIMIT).collect()
}

fn parse_classification_entry(entry: &serde_json::Value) -> Option<(QuestionId, Classification)> {
    let question_id = entry.get("question_id")?.as_str()?;
    let question_id = QuestionId::from_str(question_id).ok()?;

    let topic = entry.get("topic")?.as_str()?.to_string();
    if !is_valid_topic(&topic) {
        return None;
    }
    let difficulty = entry
        .get("difficulty")
        .and_then(serde_json::Value::as_str)
        .and_then(Difficulty::parse)?;
    let cognitive_level = entry
        .get("cognitive_level")
        .and_then(serde_json::Value::as_str)
        .and_then(CognitiveLevel::parse)?;

    let subtopic = entry
        .get("subtopic")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string);
    let grade_level = entry
        .get("grade_level")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string);
    let tags = entry
        .get("tags")
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some((
        question_id,
        Classification {
            topic,
            subtopic,
            difficulty,
            grade_level,
            cognitive_level,
            tags,
        },
    ))
}

/// Never aborts the pipeline (§4.11 rule 5): any failure is recorded on
/// `state.metadata` as `classification_error` and the stage returns
/// normally with zero questions classified.
#[tracing::instrument(skip_all, fields(job_id = %state.job_id))]
pub async fn run(
    state: &mut PipelineState,
    llm: &Arc<dyn LlmProvider>,
    templates: &PromptTemplateRegistry,
    question_store: &Arc<dyn QuestionStore>,
) -> usize {
    if state.question_ids.is_empty() {
        return 0;
    }

    let questions = match question_store.get_many(&state.question_ids).await {
        Ok(q) => q,
        Err(err) => {
            state.record_metadata("classification_error", err.to_string());
            return 0;
        }
    };

    let Some(template) = templates.get("classification") else {
        state.record_metadata("classification_error", "missing classification template");
        return 0;
    };

    let listing: Vec<String> = questions
        .iter()
        .map(|q| {
            format!(
                "id={} kind={:?} text={} options={:?}",
                q.id,
                q.kind,
                truncate(&q.text),
                q.options
            )
        })
        .collect();
    let mut vars = HashMap::new();
    vars.insert("questions".to_string(), listing.join("\n"));
    let prompt = template.render(&vars);

    let response = match llm.invoke(&prompt).await {
        Ok(r) => r,
        Err(err) => {
            state.record_metadata("classification_error", err.to_string());
            return 0;
        }
    };

    let Some(parsed) = parse_llm_json(&response) else {
        state.record_metadata("classification_error", "could not parse classification response");
        return 0;
    };
    let Some(array) = parsed.as_array() else {
        state.record_metadata("classification_error", "classification response was not an array");
        return 0;
    };

    let classifications: Vec<(QuestionId, Classification)> =
        array.iter().filter_map(parse_classification_entry).collect();

    if classifications.is_empty() {
        state.record_metadata("classification_error", "no valid classification entries");
        return 0;
    }

    let count = classifications.len();
    if let Err(err) = question_store.apply_classifications(classifications).await {
        state.record_metadata("classification_error", err.to_string());
        return 0;
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::QuestionId;

    #[test]
    fn parse_classification_entry_rejects_unknown_topic() {
        let entry = serde_json::json!({
            "question_id": QuestionId::new().to_string(),
            "topic": "astrology",
            "difficulty": "easy",
            "cognitive_level": "knowledge",
        });
        assert!(parse_classification_entry(&entry).is_none());
    }

    #[test]
    fn parse_classification_entry_accepts_valid_shape() {
        let id = QuestionId::new();
        let entry = serde_json::json!({
            "question_id": id.to_string(),
            "topic": "math",
            "subtopic": "algebra",
            "difficulty": "medium",
            "grade_level": "8",
            "cognitive_level": "application",
            "tags": ["equations"],
        });
        let (parsed_id, classification) = parse_classification_entry(&entry).unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(classification.topic, "math");
        assert_eq!(classification.tags, vec!["equations".to_string()]);
    }

    #[test]
    fn truncate_respects_limit() {
        let long = "x".repeat(TEXT_TRUNCATION_LIMIT + 50);
        assert_eq!(truncate(&long).chars().count(), TEXT_TRUNCATION_LIMIT);
    }
}
