//! ABOUTME: Document kind detection and the persisted Document record

use crate::ids::{DocumentId, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The detected kind of a source document. Supplemented closed set (see
/// SPEC_FULL.md §11.2): a fixed extension-to-kind table, with XML further
/// disambiguated by path keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Image,
    Html,
    Xml,
    Unknown,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Xlsx => "xlsx",
            Self::Image => "image",
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Detects a document's kind from a URL path or filename; a pure function
/// of the path component only (query parameters are stripped first).
///
/// `detect_document_type(url)` depends only on the URL path; query
/// parameters do not change the result.
#[must_use]
pub fn detect_document_kind(path_or_filename: &str) -> DocumentKind {
    let without_query = path_or_filename.split(['?', '#']).next().unwrap_or("");
    let lower = without_query.to_ascii_lowercase();

    let extension = lower.rsplit('.').next().unwrap_or("");

    match extension {
        "pdf" => DocumentKind::Pdf,
        "doc" | "docx" => DocumentKind::Docx,
        "ppt" | "pptx" => DocumentKind::Pptx,
        "xls" | "xlsx" => DocumentKind::Xlsx,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => DocumentKind::Image,
        "html" | "htm" => DocumentKind::Html,
        "xml" => DocumentKind::Xml,
        _ => DocumentKind::Unknown,
    }
}

/// The persisted output of one successful run. Created by the Persistence
/// stage; never mutated thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub user_id: String,
    pub original_filename: String,
    pub source_ref: String,
    pub job_id: JobId,
    /// Markdown straight from the converter's ZIP output.
    pub raw_markdown: String,
    /// Markdown after any human/LLM cleaning pass, if one ran.
    pub cleaned_markdown: Option<String>,
    /// Markdown with local image references rewritten to served URLs.
    pub rewritten_markdown: String,
    pub kind: DocumentKind,
    pub question_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kind_from_extension() {
        assert_eq!(detect_document_kind("report.pdf"), DocumentKind::Pdf);
        assert_eq!(detect_document_kind("notes.docx"), DocumentKind::Docx);
        assert_eq!(detect_document_kind("scan.png"), DocumentKind::Image);
        assert_eq!(detect_document_kind("page.html"), DocumentKind::Html);
        assert_eq!(detect_document_kind("file.unknown"), DocumentKind::Unknown);
    }

    #[test]
    fn detection_ignores_query_parameters() {
        let with_query = detect_document_kind("https://host/docs/report.pdf?sig=abc&exp=123");
        let without_query = detect_document_kind("https://host/docs/report.pdf");
        assert_eq!(with_query, without_query);
        assert_eq!(with_query, DocumentKind::Pdf);
    }

    #[test]
    fn xml_is_recognized_regardless_of_path_keywords() {
        assert_eq!(
            detect_document_kind("/specs/uspto/patent.xml"),
            DocumentKind::Xml
        );
        assert_eq!(detect_document_kind("/data/plain.xml"), DocumentKind::Xml);
    }
}
