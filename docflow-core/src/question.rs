//! ABOUTME: Question data model, educational classification dimensions, and
//! ABOUTME: the deterministic text composition used by the embedding stage

use crate::ids::{DocumentId, QuestionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One of the four recognized question shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    OpenEnded,
    TrueFalse,
    FillInBlank,
}

/// Difficulty tier assigned during classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bloom's taxonomy tier assigned to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
    Knowledge,
    Comprehension,
    Application,
    Analysis,
    Synthesis,
    Evaluation,
}

impl CognitiveLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Comprehension => "comprehension",
            Self::Application => "application",
            Self::Analysis => "analysis",
            Self::Synthesis => "synthesis",
            Self::Evaluation => "evaluation",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "knowledge" => Some(Self::Knowledge),
            "comprehension" => Some(Self::Comprehension),
            "application" => Some(Self::Application),
            "analysis" => Some(Self::Analysis),
            "synthesis" => Some(Self::Synthesis),
            "evaluation" => Some(Self::Evaluation),
            _ => None,
        }
    }
}

/// The closed topic set (SPEC_FULL.md §11.4).
pub const TOPICS: &[&str] = &[
    "math",
    "physics",
    "chemistry",
    "biology",
    "computer_science",
    "history",
    "geography",
    "literature",
    "language",
    "economics",
    "other",
];

#[must_use]
pub fn is_valid_topic(topic: &str) -> bool {
    TOPICS.contains(&topic)
}

/// Educational classification assigned by the Classification stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub topic: String,
    pub subtopic: Option<String>,
    pub difficulty: Difficulty,
    pub grade_level: Option<String>,
    pub cognitive_level: CognitiveLevel,
    pub tags: Vec<String>,
}

/// A single educational item extracted from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub user_id: String,
    pub document_id: DocumentId,
    pub ordinal: u32,
    pub text: String,
    pub kind: QuestionKind,
    /// label -> option text; non-empty iff `kind == MultipleChoice`.
    pub options: BTreeMap<String, String>,
    pub image_refs: Vec<String>,
    pub correct_answer: Option<String>,
    pub classification: Option<Classification>,
    pub is_classified: bool,
    pub embedding: Option<Vec<f32>>,
    pub is_embedded: bool,
}

impl Question {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        document_id: DocumentId,
        ordinal: u32,
        text: impl Into<String>,
        kind: QuestionKind,
        options: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: QuestionId::new(),
            user_id: user_id.into(),
            document_id,
            ordinal,
            text: text.into(),
            kind,
            options,
            image_refs: Vec::new(),
            correct_answer: None,
            classification: None,
            is_classified: false,
            embedding: None,
            is_embedded: false,
        }
    }

    /// `options` non-empty iff `kind == MultipleChoice`.
    #[must_use]
    pub fn options_invariant_holds(&self) -> bool {
        (self.kind == QuestionKind::MultipleChoice) == !self.options.is_empty()
    }

    pub fn apply_classification(&mut self, classification: Classification) {
        self.classification = Some(classification);
        self.is_classified = true;
    }

    pub fn apply_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding = Some(embedding);
        self.is_embedded = true;
    }
}

/// Deterministically composes the text representation fed to the embedding
/// provider: optional context header, optional keyword line (up to 5 tags),
/// the question text, then each option as `<label>) <text>` in sorted
/// label order.
#[must_use]
pub fn build_question_text(question: &Question) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(classification) = &question.classification {
        let mut header_parts = vec![classification.topic.clone()];
        if let Some(subtopic) = &classification.subtopic {
            header_parts.push(subtopic.clone());
        }
        header_parts.push(format!("{} difficulty", classification.difficulty));
        if let Some(grade) = &classification.grade_level {
            header_parts.push(format!("grade {grade}"));
        }
        parts.push(format!("[{}]", header_parts.join(" | ")));

        if !classification.tags.is_empty() {
            let keywords: Vec<&str> = classification
                .tags
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            parts.push(format!("Keywords: {}", keywords.join(", ")));
        }
    }

    parts.push(question.text.clone());

    for (label, text) in &question.options {
        parts.push(format!("{label}) {text}"));
    }

    parts.join("\n")
}
