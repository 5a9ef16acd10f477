//! ABOUTME: The typed record threaded through every pipeline stage (C3)

use crate::converter_options::ConverterOptions;
use crate::document::DocumentKind;
use crate::ids::{DocumentId, JobId, QuestionId};
use crate::job::JobStage;
use std::collections::HashMap;
use std::path::PathBuf;

/// The outcome of one Validation-stage scoring round, carried on
/// `PipelineState` rather than thrown as an exception (§9 Design Notes:
/// "Retry loop as state transitions, not exceptions").
#[derive(Debug, Clone, Default)]
pub struct ValidationFeedback {
    pub score: Option<u8>,
    pub issues: Vec<String>,
    pub recommendation: Option<String>,
}

/// The in-flight record for a single job. Exclusively owned by the
/// orchestrator; never concurrently mutated. Stages read any field but are
/// only permitted to write the fields documented as their output in §4.8
/// through §4.12 — a convention this type does not mechanically enforce.
#[derive(Debug, Clone)]
pub struct PipelineState {
    // Identity fields.
    pub job_id: JobId,
    pub user_id: String,

    // Input fields.
    pub source_ref: String,
    pub filename: Option<String>,
    pub kind: DocumentKind,

    // Working fields.
    pub output_zip_path: Option<PathBuf>,
    pub source_file_path: Option<PathBuf>,
    pub raw_markdown: Option<String>,
    pub cleaned_markdown: Option<String>,
    pub rewritten_markdown: Option<String>,
    pub question_ids: Vec<QuestionId>,
    pub image_url_map: HashMap<String, String>,
    pub document_id: Option<DocumentId>,

    // Control fields.
    pub stage: JobStage,
    pub error_message: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub validation_attempts: u32,
    pub validation_passed: bool,
    pub docling_options: ConverterOptions,
    pub validation_feedback: ValidationFeedback,
}

impl PipelineState {
    #[must_use]
    pub fn new(job_id: JobId, user_id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        let source_ref = source_ref.into();
        let kind = crate::document::detect_document_kind(&source_ref);
        Self {
            job_id,
            user_id: user_id.into(),
            source_ref,
            filename: None,
            kind,
            output_zip_path: None,
            source_file_path: None,
            raw_markdown: None,
            cleaned_markdown: None,
            rewritten_markdown: None,
            question_ids: Vec::new(),
            image_url_map: HashMap::new(),
            document_id: None,
            stage: JobStage::Queued,
            error_message: None,
            metadata: serde_json::Map::new(),
            validation_attempts: 0,
            validation_passed: false,
            docling_options: ConverterOptions::default(),
            validation_feedback: ValidationFeedback::default(),
        }
    }

    /// True once neither a document nor any Markdown was ever produced —
    /// the condition under which the job is marked failed with the
    /// "No content extracted" message (§7 User-visible failure).
    #[must_use]
    pub fn produced_no_content(&self) -> bool {
        self.document_id.is_none() && self.raw_markdown.is_none() && self.output_zip_path.is_none()
    }

    pub fn record_metadata(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}
