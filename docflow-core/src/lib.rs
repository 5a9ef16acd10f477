//! ABOUTME: Shared data model and error taxonomy for the document processing pipeline
//! ABOUTME: Every other docflow crate depends on this one for Job/Document/Question/PipelineState

pub mod converter_options;
pub mod document;
pub mod error;
pub mod ids;
pub mod job;
pub mod pipeline_state;
pub mod prompt_template;
pub mod question;

pub use converter_options::{ConverterOptions, ConverterOptionsOverride};
pub use document::{detect_document_kind, Document, DocumentKind};
pub use error::{PipelineError, Result};
pub use ids::{DocumentId, JobId, QuestionId};
pub use job::{Job, JobStage};
pub use pipeline_state::{PipelineState, ValidationFeedback};
pub use prompt_template::{PromptTemplate, PromptTemplateRegistry};
pub use question::{
    build_question_text, is_valid_topic, Classification, CognitiveLevel, Difficulty, Question,
    QuestionKind, TOPICS,
};
