//! Property-based tests for docflow-core
//!
//! Covers the round-trip/idempotence properties named in the system
//! design doc: `detect_document_kind` is a pure function of the URL
//! path only, and `build_question_text` is pure.

use docflow_core::document::detect_document_kind;
use docflow_core::question::{build_question_text, Classification, CognitiveLevel, Difficulty, Question, QuestionKind};
use docflow_core::DocumentId;
use proptest::prelude::*;
use std::collections::BTreeMap;

prop_compose! {
    fn arb_path_segment()(s in "[a-zA-Z0-9_./-]{1,40}") -> String {
        s
    }
}

prop_compose! {
    fn arb_query_string()(s in "[a-zA-Z0-9_=&%-]{0,30}") -> String {
        s
    }
}

const EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "jpg", "jpeg", "png", "gif", "bmp",
    "webp", "html", "htm", "xml", "exe", "zip",
];

fn arb_extension() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(EXTENSIONS)
}

proptest! {
    #[test]
    fn detect_document_kind_ignores_query_string(
        path in arb_path_segment(),
        ext in arb_extension(),
        query in arb_query_string(),
    ) {
        let base = format!("{path}.{ext}");
        let with_query = format!("{base}?{query}");
        prop_assert_eq!(detect_document_kind(&base), detect_document_kind(&with_query));
    }

    #[test]
    fn detect_document_kind_ignores_fragment(
        path in arb_path_segment(),
        ext in arb_extension(),
        fragment in arb_path_segment(),
    ) {
        let base = format!("{path}.{ext}");
        let with_fragment = format!("{base}#{fragment}");
        prop_assert_eq!(detect_document_kind(&base), detect_document_kind(&with_fragment));
    }

    #[test]
    fn detect_document_kind_is_deterministic(path in "[a-zA-Z0-9_./?#=&-]{0,80}") {
        prop_assert_eq!(detect_document_kind(&path), detect_document_kind(&path));
    }

    #[test]
    fn build_question_text_is_pure(
        text in "[a-zA-Z0-9 .,?]{1,80}",
        option_count in 0usize..4,
    ) {
        let mut options = BTreeMap::new();
        for i in 0..option_count {
            options.insert(format!("opt{i}"), format!("value {i}"));
        }
        let question = Question::new(
            "user-1",
            DocumentId::new(),
            1,
            text,
            if option_count > 0 { QuestionKind::MultipleChoice } else { QuestionKind::OpenEnded },
            options,
        );
        prop_assert_eq!(build_question_text(&question), build_question_text(&question));
    }

    #[test]
    fn build_question_text_always_contains_question_text(
        text in "[a-zA-Z0-9 .,?]{1,80}",
    ) {
        let question = Question::new(
            "user-1",
            DocumentId::new(),
            1,
            text.clone(),
            QuestionKind::OpenEnded,
            BTreeMap::new(),
        );
        prop_assert!(build_question_text(&question).contains(&text));
    }

    #[test]
    fn build_question_text_option_lines_appear_in_label_order(
        labels in prop::collection::vec("[A-D]", 2..=4),
    ) {
        let mut options = BTreeMap::new();
        let mut unique_labels: Vec<String> = labels.into_iter().collect();
        unique_labels.sort();
        unique_labels.dedup();
        prop_assume!(unique_labels.len() >= 2);
        for label in &unique_labels {
            options.insert(label.clone(), format!("option {label}"));
        }
        let question = Question::new(
            "user-1",
            DocumentId::new(),
            1,
            "Pick one.",
            QuestionKind::MultipleChoice,
            options,
        );
        let rendered = build_question_text(&question);
        let mut last_index = 0usize;
        for label in &unique_labels {
            let marker = format!("{label}) option {label}");
            let idx = rendered.find(&marker).expect("each option line rendered");
            prop_assert!(idx >= last_index);
            last_index = idx;
        }
    }

    #[test]
    fn build_question_text_classification_header_always_leads(
        topic in "[a-z_]{1,20}",
        tag_count in 0usize..8,
    ) {
        let tags: Vec<String> = (0..tag_count).map(|i| format!("tag{i}")).collect();
        let mut question = Question::new(
            "user-1",
            DocumentId::new(),
            1,
            "What is the answer?",
            QuestionKind::OpenEnded,
            BTreeMap::new(),
        );
        question.apply_classification(Classification {
            topic: topic.clone(),
            subtopic: None,
            difficulty: Difficulty::Medium,
            grade_level: None,
            cognitive_level: CognitiveLevel::Application,
            tags,
        });
        let rendered = build_question_text(&question);
        let expected_prefix = format!("[{}", topic);
        prop_assert!(rendered.starts_with(&expected_prefix));
    }
}
