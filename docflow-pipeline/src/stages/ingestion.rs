//! ABOUTME: Ingestion Stage (C8): downloads the source and converts it to a ZIP bundle

use docflow_converter::DocumentConverter;
use docflow_core::{DocumentKind, PipelineError, PipelineState};
use std::sync::Arc;

#[tracing::instrument(skip(state, converter), fields(job_id = %state.job_id))]
pub async fn run(
    state: &mut PipelineState,
    converter: &Arc<dyn DocumentConverter>,
) -> Result<(), PipelineError> {
    if state.kind == DocumentKind::Unknown {
        return Err(PipelineError::UnknownKind {
            reference: state.source_ref.clone(),
        });
    }

    let is_retry = state.validation_attempts > 0 && state.source_file_path.is_some();

    let source_path = if is_retry {
        state
            .source_file_path
            .clone()
            .expect("checked above: is_retry implies source_file_path is set")
    } else {
        let filename = state
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}-source", state.job_id));
        let path = converter
            .download_to_temp(&state.source_ref, &filename)
            .await
            .map_err(|e| {
                state.error_message = Some(e.to_string());
                e
            })?;
        state.source_file_path = Some(path.clone());
        path
    };

    let job_id = state.job_id.to_string();
    match converter
        .convert_file_to_zip(&source_path, state.kind, &job_id, &state.docling_options)
        .await
    {
        Ok(response) => {
            state.output_zip_path = Some(response.zip_path);
            Ok(())
        }
        Err(err) => {
            state.error_message = Some(err.to_string());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docflow_converter::{ConvertByUrlResponse, ConvertToZipResponse};
    use docflow_core::document::DocumentKind;
    use docflow_core::{ConverterOptions, JobId};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeConverter {
        convert_calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentConverter for FakeConverter {
        async fn convert_by_url(
            &self,
            _url: &str,
            _kind: DocumentKind,
            _options: &ConverterOptions,
        ) -> Result<ConvertByUrlResponse, PipelineError> {
            unimplemented!("ingestion only uses file-to-zip mode")
        }

        async fn convert_file_to_zip(
            &self,
            _local_path: &Path,
            _kind: DocumentKind,
            _job_id: &str,
            _options: &ConverterOptions,
        ) -> Result<ConvertToZipResponse, PipelineError> {
            self.convert_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ConvertToZipResponse {
                zip_path: PathBuf::from("/tmp/fake/output.zip"),
                elapsed: Duration::from_millis(1),
            })
        }

        async fn download_to_temp(&self, _url: &str, filename: &str) -> Result<PathBuf, PipelineError> {
            Ok(PathBuf::from(format!("/tmp/fake/{filename}")))
        }

        async fn cleanup_temp_file(&self, _path: &Path) {}
    }

    #[tokio::test]
    async fn first_attempt_downloads_then_converts() {
        let converter: Arc<dyn DocumentConverter> = Arc::new(FakeConverter {
            convert_calls: AtomicUsize::new(0),
        });
        let mut state = PipelineState::new(JobId::new(), "user-1", "https://host/doc.pdf");

        run(&mut state, &converter).await.unwrap();

        assert!(state.source_file_path.is_some());
        assert!(state.output_zip_path.is_some());
    }

    #[tokio::test]
    async fn unknown_kind_skips_conversion_entirely() {
        let converter: Arc<dyn DocumentConverter> = Arc::new(FakeConverter {
            convert_calls: AtomicUsize::new(0),
        });
        let mut state = PipelineState::new(JobId::new(), "user-1", "https://host/file.unknown");

        let err = run(&mut state, &converter).await.unwrap_err();

        assert!(matches!(err, PipelineError::UnknownKind { .. }));
        assert!(state.source_file_path.is_none());
        assert!(state.output_zip_path.is_none());
    }

    #[tokio::test]
    async fn retry_reuses_existing_source_file_without_redownloading() {
        let converter: Arc<dyn DocumentConverter> = Arc::new(FakeConverter {
            convert_calls: AtomicUsize::new(0),
        });
        let mut state = PipelineState::new(JobId::new(), "user-1", "https://host/doc.pdf");
        state.validation_attempts = 1;
        state.source_file_path = Some(PathBuf::from("/tmp/fake/existing-source.pdf"));

        run(&mut state, &converter).await.unwrap();

        assert_eq!(
            state.source_file_path,
            Some(PathBuf::from("/tmp/fake/existing-source.pdf"))
        );
    }
}
