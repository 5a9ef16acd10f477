//! ABOUTME: The closed set of converter option keys (C4) and their defaults,
//! ABOUTME: plus the per-validation-attempt override ladder used by Validation (C9)

use serde::{Deserialize, Serialize};

/// OCR engine choices recognized by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngine {
    Easyocr,
    Tesseract,
}

/// Table extraction fidelity/speed tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableMode {
    Accurate,
    Fast,
}

/// Whether images are referenced by path or embedded inline in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageExportMode {
    Referenced,
    Embedded,
}

/// Conversion pipeline variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterPipeline {
    Standard,
    Vlm,
    Asr,
    Legacy,
}

/// Whether the converter returns Markdown inline or a ZIP bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Inbody,
    Zip,
}

/// The closed, recognized option bag passed to the converter (§4.4).
///
/// Defaults mirror SPEC_FULL.md §11.5. Every field is individually
/// overridable by a validation-attempt override (§4.9); overrides are
/// merged field-by-field onto this base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterOptions {
    pub target_type: TargetType,
    pub to_formats: Vec<String>,
    pub do_ocr: bool,
    pub force_ocr: bool,
    pub ocr_engine: OcrEngine,
    pub ocr_lang: Vec<String>,
    pub pdf_backend: String,
    pub table_mode: TableMode,
    pub do_table_structure: bool,
    pub table_cell_matching: bool,
    pub include_images: bool,
    pub images_scale: u32,
    pub image_export_mode: ImageExportMode,
    pub pipeline: ConverterPipeline,
    pub page_range: (u64, u64),
    pub document_timeout: u64,
    pub do_formula_enrichment: bool,
    pub do_code_enrichment: bool,
    pub do_picture_classification: bool,
    pub do_picture_description: bool,
    pub abort_on_error: bool,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            target_type: TargetType::Zip,
            to_formats: vec!["md".to_string()],
            do_ocr: true,
            force_ocr: false,
            ocr_engine: OcrEngine::Easyocr,
            ocr_lang: vec!["en".to_string()],
            pdf_backend: "dlparse_v2".to_string(),
            table_mode: TableMode::Accurate,
            do_table_structure: true,
            table_cell_matching: true,
            include_images: true,
            images_scale: 2,
            image_export_mode: ImageExportMode::Referenced,
            pipeline: ConverterPipeline::Standard,
            page_range: (1, u64::MAX),
            document_timeout: 604_800,
            do_formula_enrichment: true,
            do_code_enrichment: false,
            do_picture_classification: false,
            do_picture_description: false,
            abort_on_error: false,
        }
    }
}

/// One entry in the bounded override ladder consulted by Validation (§4.9)
/// when a conversion attempt scores below the pass threshold.
#[derive(Debug, Clone, Default)]
pub struct ConverterOptionsOverride {
    pub pdf_backend: Option<String>,
    pub force_ocr: Option<bool>,
    pub ocr_engine: Option<OcrEngine>,
    pub do_formula_enrichment: Option<bool>,
}

impl ConverterOptionsOverride {
    /// Attempt-2 override from §4.9.
    #[must_use]
    pub fn attempt_two() -> Self {
        Self {
            pdf_backend: Some("dlparse_v4".to_string()),
            force_ocr: Some(true),
            ocr_engine: Some(OcrEngine::Tesseract),
            do_formula_enrichment: None,
        }
    }

    /// Attempt-3 override from §4.9.
    #[must_use]
    pub fn attempt_three() -> Self {
        Self {
            pdf_backend: Some("dlparse_v2".to_string()),
            force_ocr: Some(true),
            ocr_engine: Some(OcrEngine::Easyocr),
            do_formula_enrichment: Some(true),
        }
    }

    /// Looks up the override for a 1-based validation attempt number that
    /// is about to be retried (i.e. the attempt that *just failed* was
    /// `attempt_number`, so the next conversion uses this override).
    #[must_use]
    pub fn for_next_attempt(next_attempt_number: u32) -> Option<Self> {
        match next_attempt_number {
            2 => Some(Self::attempt_two()),
            3 => Some(Self::attempt_three()),
            _ => None,
        }
    }

    /// Applies this override onto a base options bag, field by field.
    #[must_use]
    pub fn apply(&self, mut base: ConverterOptions) -> ConverterOptions {
        if let Some(backend) = &self.pdf_backend {
            base.pdf_backend = backend.clone();
        }
        if let Some(force_ocr) = self.force_ocr {
            base.force_ocr = force_ocr;
        }
        if let Some(engine) = self.ocr_engine {
            base.ocr_engine = engine;
        }
        if let Some(formula) = self.do_formula_enrichment {
            base.do_formula_enrichment = formula;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_force_zip_target_for_file_mode() {
        let opts = ConverterOptions::default();
        assert_eq!(opts.target_type, TargetType::Zip);
        assert_eq!(opts.to_formats, vec!["md".to_string()]);
    }

    #[test]
    fn attempt_two_override_matches_spec() {
        let overlay = ConverterOptionsOverride::for_next_attempt(2).unwrap();
        let applied = overlay.apply(ConverterOptions::default());
        assert_eq!(applied.pdf_backend, "dlparse_v4");
        assert!(applied.force_ocr);
        assert_eq!(applied.ocr_engine, OcrEngine::Tesseract);
    }

    #[test]
    fn attempt_three_override_matches_spec() {
        let overlay = ConverterOptionsOverride::for_next_attempt(3).unwrap();
        let applied = overlay.apply(ConverterOptions::default());
        assert_eq!(applied.pdf_backend, "dlparse_v2");
        assert!(applied.force_ocr);
        assert_eq!(applied.ocr_engine, OcrEngine::Easyocr);
        assert!(applied.do_formula_enrichment);
    }

    #[test]
    fn no_override_beyond_attempt_three() {
        assert!(ConverterOptionsOverride::for_next_attempt(4).is_none());
    }
}
