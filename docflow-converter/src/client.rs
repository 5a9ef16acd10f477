//! ABOUTME: Document Converter Client (C4): wraps an external conversion service

use async_trait::async_trait;
use docflow_core::document::DocumentKind;
use docflow_core::{ConverterOptions, PipelineError};
use docflow_resilience::{retry_default, CircuitBreaker, RetryConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Response from URL-mode conversion (§4.4 operation 1).
#[derive(Debug, Clone)]
pub struct ConvertByUrlResponse {
    pub markdown: String,
    pub filename: Option<String>,
    pub elapsed: Duration,
}

/// Response from file-to-ZIP-mode conversion (§4.4 operation 2).
#[derive(Debug, Clone)]
pub struct ConvertToZipResponse {
    pub zip_path: PathBuf,
    pub elapsed: Duration,
}

/// External collaborator boundary for the document converter. Kept as a
/// trait so stages depend on the capability, not a concrete HTTP client —
/// the same shape the teacher uses for `ProviderInstance`.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert_by_url(
        &self,
        url: &str,
        kind: DocumentKind,
        options: &ConverterOptions,
    ) -> Result<ConvertByUrlResponse, PipelineError>;

    async fn convert_file_to_zip(
        &self,
        local_path: &Path,
        kind: DocumentKind,
        job_id: &str,
        options: &ConverterOptions,
    ) -> Result<ConvertToZipResponse, PipelineError>;

    async fn download_to_temp(&self, url: &str, filename: &str) -> Result<PathBuf, PipelineError>;

    /// Best-effort removal; failures are logged, never propagated.
    async fn cleanup_temp_file(&self, path: &Path);
}

/// HTTP-backed implementation. Two endpoints mirror the source's
/// URL-mode/file-mode split: a JSON endpoint for `convert_by_url`, and a
/// multipart endpoint for `convert_file_to_zip`.
pub struct HttpDocumentConverter {
    http: reqwest::Client,
    url_endpoint: String,
    file_endpoint: String,
    timeout: Duration,
    temp_dir: PathBuf,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl HttpDocumentConverter {
    #[must_use]
    pub fn new(
        url_endpoint: impl Into<String>,
        file_endpoint: impl Into<String>,
        timeout: Duration,
        temp_dir: PathBuf,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            url_endpoint: url_endpoint.into(),
            file_endpoint: file_endpoint.into(),
            timeout,
            temp_dir,
            breaker,
            retry: RetryConfig::new(2, Duration::from_secs(1), 2.0),
        }
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.join(job_id)
    }

    fn check_breaker(&self) -> Result<(), PipelineError> {
        self.breaker
            .check()
            .map_err(|retry_after| PipelineError::CircuitOpen {
                service: self.breaker.service_name().to_string(),
                retry_after,
            })
    }

    fn build_options_payload(kind: DocumentKind, options: &ConverterOptions) -> serde_json::Value {
        serde_json::json!({
            "from_formats": [kind.to_string()],
            "to_formats": options.to_formats,
            "target_type": options.target_type,
            "image_export_mode": options.image_export_mode,
            "do_ocr": options.do_ocr,
            "force_ocr": options.force_ocr,
            "ocr_engine": options.ocr_engine,
            "ocr_lang": options.ocr_lang,
            "pdf_backend": options.pdf_backend,
            "table_mode": options.table_mode,
            "table_cell_matching": options.table_cell_matching,
            "do_table_structure": options.do_table_structure,
            "include_images": options.include_images,
            "images_scale": options.images_scale,
            "pipeline": options.pipeline,
            "page_range": [options.page_range.0, options.page_range.1],
            "document_timeout": options.document_timeout,
            "do_formula_enrichment": options.do_formula_enrichment,
            "do_code_enrichment": options.do_code_enrichment,
            "do_picture_classification": options.do_picture_classification,
            "do_picture_description": options.do_picture_description,
            "abort_on_error": options.abort_on_error,
        })
    }
}

#[async_trait]
impl DocumentConverter for HttpDocumentConverter {
    async fn convert_by_url(
        &self,
        url: &str,
        kind: DocumentKind,
        options: &ConverterOptions,
    ) -> Result<ConvertByUrlResponse, PipelineError> {
        self.check_breaker()?;
        let started = std::time::Instant::now();

        let payload = serde_json::json!({
            "options": Self::build_options_payload(kind, options),
            "sources": [{ "kind": "http", "url": url }],
        });

        let result = retry_default("converter.convert_by_url", self.retry, || {
            let payload = payload.clone();
            async move {
                let response = self
                    .http
                    .post(&self.url_endpoint)
                    .json(&payload)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(|e| classify_reqwest_error("converter", &e))?;

                if response.status().as_u16() >= 500 {
                    return Err(PipelineError::Transient {
                        service: "converter".to_string(),
                        message: format!("HTTP {}", response.status()),
                    });
                }
                if !response.status().is_success() {
                    return Err(PipelineError::ParseFormat {
                        source_kind: "converter".to_string(),
                        message: format!("HTTP {}", response.status()),
                    });
                }

                let body: serde_json::Value = response.json().await.map_err(|e| {
                    PipelineError::ParseFormat {
                        source_kind: "converter".to_string(),
                        message: e.to_string(),
                    }
                })?;

                let markdown = body
                    .get("document")
                    .and_then(|d| d.get("md_content"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| PipelineError::ParseFormat {
                        source_kind: "converter".to_string(),
                        message: "response missing document.md_content".to_string(),
                    })?
                    .to_string();

                let filename = body
                    .get("document")
                    .and_then(|d| d.get("filename"))
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);

                Ok((markdown, filename))
            }
        })
        .await;

        match result {
            Ok((markdown, filename)) => {
                self.breaker.record_success();
                Ok(ConvertByUrlResponse {
                    markdown,
                    filename,
                    elapsed: started.elapsed(),
                })
            }
            Err(err) => {
                if err.is_retryable() {
                    self.breaker.record_failure();
                }
                Err(err)
            }
        }
    }

    async fn convert_file_to_zip(
        &self,
        local_path: &Path,
        kind: DocumentKind,
        job_id: &str,
        options: &ConverterOptions,
    ) -> Result<ConvertToZipResponse, PipelineError> {
        self.check_breaker()?;
        let started = std::time::Instant::now();

        let job_dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| PipelineError::general(format!("failed to create job dir: {e}")))?;
        let output_zip_path = job_dir.join("output.zip");

        let file_bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| PipelineError::general(format!("failed to read source file: {e}")))?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let options_payload = Self::build_options_payload(kind, options);

        let result = retry_default("converter.convert_file_to_zip", self.retry, || {
            let file_bytes = file_bytes.clone();
            let file_name = file_name.clone();
            let options_payload = options_payload.clone();
            async move {
                let part = reqwest::multipart::Part::bytes(file_bytes.clone()).file_name(file_name.clone());
                let form = reqwest::multipart::Form::new()
                    .part("files", part)
                    .text("target_type", "zip")
                    .text("options", options_payload.to_string());

                let response = self
                    .http
                    .post(&self.file_endpoint)
                    .multipart(form)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(|e| classify_reqwest_error("converter", &e))?;

                if response.status().as_u16() >= 500 {
                    return Err(PipelineError::Transient {
                        service: "converter".to_string(),
                        message: format!("HTTP {}", response.status()),
                    });
                }

                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                if content_type.contains("application/json") {
                    let body: serde_json::Value = response.json().await.unwrap_or_default();
                    return Err(PipelineError::ParseFormat {
                        source_kind: "converter".to_string(),
                        message: format!("expected ZIP, got JSON error envelope: {body}"),
                    });
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| classify_reqwest_error("converter", &e))?;
                Ok(bytes.to_vec())
            }
        })
        .await;

        match result {
            Ok(bytes) => {
                tokio::fs::write(&output_zip_path, &bytes)
                    .await
                    .map_err(|e| PipelineError::general(format!("failed to write zip: {e}")))?;
                self.breaker.record_success();
                Ok(ConvertToZipResponse {
                    zip_path: output_zip_path,
                    elapsed: started.elapsed(),
                })
            }
            Err(err) => {
                if err.is_retryable() {
                    self.breaker.record_failure();
                }
                Err(err)
            }
        }
    }

    async fn download_to_temp(&self, url: &str, filename: &str) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| PipelineError::general(format!("failed to create temp dir: {e}")))?;
        let destination = self.temp_dir.join(filename);

        let bytes = retry_default("converter.download_to_temp", self.retry, || async {
            let response = self
                .http
                .get(url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| classify_reqwest_error("converter", &e))?;
            if !response.status().is_success() {
                return Err(PipelineError::Transient {
                    service: "converter".to_string(),
                    message: format!("HTTP {}", response.status()),
                });
            }
            response
                .bytes()
                .await
                .map_err(|e| classify_reqwest_error("converter", &e))
        })
        .await?;

        tokio::fs::write(&destination, &bytes)
            .await
            .map_err(|e| PipelineError::general(format!("failed to write download: {e}")))?;
        Ok(destination)
    }

    async fn cleanup_temp_file(&self, path: &Path) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %err, "failed to clean up temp file");
            }
        }
    }
}

fn classify_reqwest_error(service: &str, error: &reqwest::Error) -> PipelineError {
    if error.is_timeout() || error.is_connect() {
        PipelineError::Transient {
            service: service.to_string(),
            message: error.to_string(),
        }
    } else {
        PipelineError::ParseFormat {
            source_kind: service.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_resilience::BreakerConfig;

    #[tokio::test]
    async fn cleanup_missing_file_does_not_panic() {
        let converter = HttpDocumentConverter::new(
            "http://localhost:1/url",
            "http://localhost:1/file",
            Duration::from_millis(10),
            std::env::temp_dir(),
            Arc::new(CircuitBreaker::new("converter", BreakerConfig::default())),
        );
        converter
            .cleanup_temp_file(Path::new("/nonexistent/path/does-not-exist"))
            .await;
    }

    #[tokio::test]
    async fn open_circuit_rejects_before_any_network_call() {
        let breaker = Arc::new(CircuitBreaker::new("converter", BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        }));
        breaker.record_failure();

        let converter = HttpDocumentConverter::new(
            "http://localhost:1/url",
            "http://localhost:1/file",
            Duration::from_millis(10),
            std::env::temp_dir(),
            breaker,
        );

        let result = converter
            .convert_by_url("http://example.com/a.pdf", DocumentKind::Pdf, &ConverterOptions::default())
            .await;
        assert!(matches!(result, Err(PipelineError::CircuitOpen { .. })));
    }
}
