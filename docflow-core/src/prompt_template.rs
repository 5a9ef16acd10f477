//! ABOUTME: Minimal prompt template rendering (SPEC_FULL.md §11.1)
//! ABOUTME: Persistence, versioning CRUD, and A/B assignment remain external collaborators

use std::collections::HashMap;

/// A named, versioned object exposing `render(variables)`. Template
/// *persistence* (CRUD, A/B assignment) is an external collaborator per
/// §1's Non-goals; this type only renders an already-resolved template
/// body.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub version: u32,
    body: String,
}

impl PromptTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            body: body.into(),
        }
    }

    /// Substitutes every `{variable}` placeholder with its bound value.
    /// Placeholders without a binding are left untouched, matching a
    /// permissive template engine rather than failing on unknown keys.
    #[must_use]
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        let mut rendered = self.body.clone();
        for (key, value) in variables {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        rendered
    }
}

/// Built-in registry of the fixed templates named in §4.9/§4.10/§4.11.
/// A real deployment may override these from the external prompt-template
/// store; these serve as the default rendering path.
pub struct PromptTemplateRegistry {
    templates: HashMap<&'static str, PromptTemplate>,
}

impl PromptTemplateRegistry {
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "validation_scoring",
            PromptTemplate::new(
                "validation_scoring",
                1,
                "You are grading the quality of a document-to-Markdown conversion.\n\
                 Source filename: {source_filename}\n\
                 File type: {file_type}\n\
                 File size: {file_size} bytes\n\
                 Images found: {image_list}\n\n\
                 Markdown content:\n{markdown_content}\n\n\
                 Respond with JSON: {{\"score\": 0-100, \"passed\": bool, \"issues\": [string], \"recommendation\": string}}",
            ),
        );
        templates.insert(
            "question_extraction",
            PromptTemplate::new(
                "question_extraction",
                1,
                "Extract every question from the following Markdown document.\n\n\
                 {markdown_content}\n\n\
                 Respond with a JSON array; each element has question_number, question_text, \
                 question_type, optional options (label -> text), optional image_urls, optional metadata.",
            ),
        );
        templates.insert(
            "classification",
            PromptTemplate::new(
                "classification",
                1,
                "Classify each question below along topic, subtopic, difficulty, grade_level, \
                 cognitive_level, and tags.\n\n{questions}\n\n\
                 Respond with a JSON array; each element has question_id, topic, subtopic, \
                 difficulty, grade_level, cognitive_level, tags.",
            ),
        );
        Self { templates }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }
}

impl Default for PromptTemplateRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
