//! ABOUTME: Object Store Client (C5): upload/serve source documents and extracted images

use crate::content_type::{content_type_for, is_image_path};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use docflow_core::PipelineError;
use docflow_resilience::{retry_default, CircuitBreaker, RetryConfig};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Maximum signed-URL lifetime allowed by the backing object store (7
/// days), per §4.5 / §6.
pub const MAX_SIGNED_URL_EXPIRATION: Duration = Duration::from_secs(604_800);

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes to `documents.in/<user_id>/<filename>`; returns a signed URL
    /// whose lifetime equals the configured expiration (capped at 7 days).
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        user_id: &str,
    ) -> Result<String, PipelineError>;

    /// Writes to `processed/<user_id>/<job_id>/images/<filename>` and
    /// returns a stable application-served URL.
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        user_id: &str,
        job_id: &str,
    ) -> Result<String, PipelineError>;

    /// Extracts every image entry from a ZIP and uploads each, with up to 3
    /// per-image retries. Returns a mapping containing both the
    /// ZIP-relative path and the bare filename for each image.
    async fn upload_images_from_zip(
        &self,
        zip_path: &Path,
        user_id: &str,
        job_id: &str,
    ) -> Result<HashMap<String, String>, PipelineError>;

    async fn get_image(
        &self,
        user_id: &str,
        job_id: &str,
        filename: &str,
    ) -> Result<Option<(Vec<u8>, &'static str)>, PipelineError>;
}

fn document_blob_path(user_id: &str, filename: &str) -> String {
    format!("documents.in/{}/{}", user_id.trim(), filename.trim())
}

fn image_blob_path(user_id: &str, job_id: &str, filename: &str) -> String {
    format!(
        "processed/{}/{}/images/{}",
        user_id.trim(),
        job_id.trim(),
        filename.trim()
    )
}

struct StoredBlob {
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process object store used by tests and local/offline runs. Signed
/// URLs are synthesized deterministically rather than cryptographically,
/// and served URLs point at a configurable base so a real HTTP layer can
/// still proxy through `get_image`.
pub struct InMemoryObjectStore {
    blobs: DashMap<String, StoredBlob>,
    signed_url_expiration: Duration,
    served_url_base: String,
    retry: RetryConfig,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new(signed_url_expiration: Duration, served_url_base: impl Into<String>) -> Self {
        Self {
            blobs: DashMap::new(),
            signed_url_expiration: signed_url_expiration.min(MAX_SIGNED_URL_EXPIRATION),
            served_url_base: served_url_base.into(),
            retry: RetryConfig::new(2, Duration::from_millis(50), 2.0),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        user_id: &str,
    ) -> Result<String, PipelineError> {
        if user_id.trim().is_empty() {
            return Err(PipelineError::general("user_id cannot be empty"));
        }
        if filename.trim().is_empty() {
            return Err(PipelineError::general("filename cannot be empty"));
        }

        let path = document_blob_path(user_id, filename);
        let expires_at =
            Utc::now() + ChronoDuration::seconds(self.signed_url_expiration.as_secs() as i64);
        self.blobs.insert(
            path.clone(),
            StoredBlob {
                bytes,
                expires_at: Some(expires_at),
            },
        );

        Ok(format!(
            "{}/{}?X-Goog-Signature=stub&exp={}",
            self.served_url_base,
            path,
            expires_at.timestamp()
        ))
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        user_id: &str,
        job_id: &str,
    ) -> Result<String, PipelineError> {
        if user_id.trim().is_empty() || filename.trim().is_empty() || job_id.trim().is_empty() {
            return Err(PipelineError::general(
                "user_id, job_id, and filename must be non-empty",
            ));
        }

        let path = image_blob_path(user_id, job_id, filename);
        self.blobs.insert(
            path.clone(),
            StoredBlob {
                bytes,
                expires_at: None,
            },
        );

        Ok(format!(
            "{}/documently/api/v1/images/{}/{}/{}",
            self.served_url_base,
            user_id.trim(),
            job_id.trim(),
            filename.trim()
        ))
    }

    async fn upload_images_from_zip(
        &self,
        zip_path: &Path,
        user_id: &str,
        job_id: &str,
    ) -> Result<HashMap<String, String>, PipelineError> {
        let file = std::fs::File::open(zip_path)
            .map_err(|e| PipelineError::general(format!("failed to open zip: {e}")))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| PipelineError::general(format!("failed to read zip: {e}")))?;

        let mut url_mapping = HashMap::new();
        let mut failed_images = Vec::new();

        for i in 0..archive.len() {
            let (name, content) = {
                let mut entry = archive
                    .by_index(i)
                    .map_err(|e| PipelineError::general(format!("failed to read zip entry: {e}")))?;
                if entry.is_dir() || !is_image_path(entry.name()) {
                    continue;
                }
                let name = entry.name().to_string();
                let mut content = Vec::new();
                std::io::Read::read_to_end(&mut entry, &mut content)
                    .map_err(|e| PipelineError::general(format!("failed to read image bytes: {e}")))?;
                (name, content)
            };

            let filename = Path::new(&name)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&name)
                .to_string();

            let uploaded = retry_default("objectstore.upload_images_from_zip", self.retry, || {
                let content = content.clone();
                let filename = filename.clone();
                async move { self.upload_image(content, &filename, user_id, job_id).await }
            })
            .await;

            match uploaded {
                Ok(url) => {
                    url_mapping.insert(name, url.clone());
                    url_mapping.insert(filename, url);
                }
                Err(err) => {
                    tracing::warn!(entry = %name, error = %err, "failed to upload image from zip");
                    failed_images.push(name);
                }
            }
        }

        if !failed_images.is_empty() {
            tracing::error!(count = failed_images.len(), images = ?failed_images, "failed to upload some images from zip");
        }

        Ok(url_mapping)
    }

    async fn get_image(
        &self,
        user_id: &str,
        job_id: &str,
        filename: &str,
    ) -> Result<Option<(Vec<u8>, &'static str)>, PipelineError> {
        if user_id.is_empty() || job_id.is_empty() || filename.is_empty() {
            return Ok(None);
        }
        let path = image_blob_path(user_id, job_id, filename);
        Ok(self
            .blobs
            .get(&path)
            .map(|blob| (blob.bytes.clone(), content_type_for(filename))))
    }
}

/// Production object store backed by a generic HTTP storage gateway
/// (`reqwest`). The gateway is expected to expose `PUT /objects/<path>`
/// for uploads and `GET /objects/<path>` for retrieval, returning the
/// served/signed URL echoed back by the gateway itself — this keeps the
/// client vendor-neutral rather than coupling it to one cloud provider's
/// SDK.
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    signed_url_expiration: Duration,
    served_url_base: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl HttpObjectStore {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        served_url_base: impl Into<String>,
        signed_url_expiration: Duration,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            signed_url_expiration: signed_url_expiration.min(MAX_SIGNED_URL_EXPIRATION),
            served_url_base: served_url_base.into(),
            breaker,
            retry: RetryConfig::new(2, Duration::from_millis(200), 2.0),
        }
    }

    fn check_breaker(&self) -> Result<(), PipelineError> {
        self.breaker
            .check()
            .map_err(|retry_after| PipelineError::CircuitOpen {
                service: self.breaker.service_name().to_string(),
                retry_after,
            })
    }

    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        self.check_breaker()?;
        let url = format!("{}/objects/{}", self.base_url, path);
        let result = retry_default("objectstore.put_object", self.retry, || {
            let bytes = bytes.clone();
            let url = url.clone();
            async move {
                let response = self
                    .http
                    .put(&url)
                    .body(bytes)
                    .send()
                    .await
                    .map_err(classify_reqwest_error)?;
                if response.status().is_server_error() {
                    return Err(PipelineError::Transient {
                        service: "object_store".to_string(),
                        message: format!("status {}", response.status()),
                    });
                }
                if !response.status().is_success() {
                    return Err(PipelineError::Storage {
                        message: format!("upload rejected: status {}", response.status()),
                        source: None,
                    });
                }
                Ok(())
            }
        })
        .await;

        match &result {
            Ok(()) => self.breaker.record_success(),
            Err(e) if e.is_retryable() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() || err.is_connect() {
        PipelineError::Transient {
            service: "object_store".to_string(),
            message: err.to_string(),
        }
    } else {
        PipelineError::Storage {
            message: err.to_string(),
            source: None,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        user_id: &str,
    ) -> Result<String, PipelineError> {
        if user_id.trim().is_empty() || filename.trim().is_empty() {
            return Err(PipelineError::general(
                "user_id and filename must be non-empty",
            ));
        }
        let path = document_blob_path(user_id, filename);
        self.put_object(&path, bytes).await?;
        let expires_at =
            Utc::now() + ChronoDuration::seconds(self.signed_url_expiration.as_secs() as i64);
        Ok(format!(
            "{}/{}?exp={}",
            self.served_url_base,
            path,
            expires_at.timestamp()
        ))
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        user_id: &str,
        job_id: &str,
    ) -> Result<String, PipelineError> {
        if user_id.trim().is_empty() || filename.trim().is_empty() || job_id.trim().is_empty() {
            return Err(PipelineError::general(
                "user_id, job_id, and filename must be non-empty",
            ));
        }
        let path = image_blob_path(user_id, job_id, filename);
        self.put_object(&path, bytes).await?;
        Ok(format!(
            "{}/documently/api/v1/images/{}/{}/{}",
            self.served_url_base,
            user_id.trim(),
            job_id.trim(),
            filename.trim()
        ))
    }

    async fn upload_images_from_zip(
        &self,
        zip_path: &Path,
        user_id: &str,
        job_id: &str,
    ) -> Result<HashMap<String, String>, PipelineError> {
        let file = std::fs::File::open(zip_path)
            .map_err(|e| PipelineError::general(format!("failed to open zip: {e}")))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| PipelineError::general(format!("failed to read zip: {e}")))?;

        let mut url_mapping = HashMap::new();
        let mut failed_images = Vec::new();

        for i in 0..archive.len() {
            let (name, content) = {
                let mut entry = archive
                    .by_index(i)
                    .map_err(|e| PipelineError::general(format!("failed to read zip entry: {e}")))?;
                if entry.is_dir() || !is_image_path(entry.name()) {
                    continue;
                }
                let name = entry.name().to_string();
                let mut content = Vec::new();
                std::io::Read::read_to_end(&mut entry, &mut content)
                    .map_err(|e| PipelineError::general(format!("failed to read image bytes: {e}")))?;
                (name, content)
            };

            let filename = Path::new(&name)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&name)
                .to_string();

            match self.upload_image(content, &filename, user_id, job_id).await {
                Ok(url) => {
                    url_mapping.insert(name, url.clone());
                    url_mapping.insert(filename, url);
                }
                Err(err) => {
                    tracing::warn!(entry = %name, error = %err, "failed to upload image from zip");
                    failed_images.push(name);
                }
            }
        }

        if !failed_images.is_empty() {
            tracing::error!(count = failed_images.len(), images = ?failed_images, "failed to upload some images from zip");
        }

        Ok(url_mapping)
    }

    async fn get_image(
        &self,
        user_id: &str,
        job_id: &str,
        filename: &str,
    ) -> Result<Option<(Vec<u8>, &'static str)>, PipelineError> {
        self.check_breaker()?;
        let path = image_blob_path(user_id, job_id, filename);
        let url = format!("{}/objects/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PipelineError::Storage {
                message: format!("get_image failed: status {}", response.status()),
                source: None,
            });
        }
        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        Ok(Some((bytes.to_vec(), content_type_for(filename))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store() -> InMemoryObjectStore {
        InMemoryObjectStore::new(Duration::from_secs(3600), "https://app.example.com")
    }

    #[tokio::test]
    async fn upload_document_returns_signed_url_under_documents_in_path() {
        let store = store();
        let url = store
            .upload_document(b"pdf-bytes".to_vec(), "report.pdf", "user-1")
            .await
            .unwrap();
        assert!(url.contains("documents.in/user-1/report.pdf"));
        assert!(url.contains('?'));
    }

    #[tokio::test]
    async fn upload_document_rejects_empty_identifiers() {
        let store = store();
        assert!(store
            .upload_document(vec![], "", "user-1")
            .await
            .is_err());
        assert!(store
            .upload_document(vec![], "f.pdf", "")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn upload_image_returns_served_url_and_round_trips_via_get_image() {
        let store = store();
        let url = store
            .upload_image(b"png-bytes".to_vec(), "diagram.png", "user-1", "job-1")
            .await
            .unwrap();
        assert!(url.contains("/images/user-1/job-1/diagram.png"));

        let (bytes, content_type) = store
            .get_image("user-1", "job-1", "diagram.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"png-bytes");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn get_image_returns_none_for_missing_blob() {
        let store = store();
        assert!(store
            .get_image("user-1", "job-1", "missing.png")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upload_images_from_zip_with_no_images_returns_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("empty.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file::<_, ()>("readme.txt", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"not an image").unwrap();
        writer.finish().unwrap();

        let store = store();
        let mapping = store
            .upload_images_from_zip(&zip_path, "user-1", "job-1")
            .await
            .unwrap();
        assert!(mapping.is_empty());
    }

    #[tokio::test]
    async fn upload_images_from_zip_maps_both_full_path_and_bare_filename() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bundle.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file::<_, ()>("images/diagram.png", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"bytes").unwrap();
        writer.finish().unwrap();

        let store = store();
        let mapping = store
            .upload_images_from_zip(&zip_path, "user-1", "job-1")
            .await
            .unwrap();
        assert!(mapping.contains_key("images/diagram.png"));
        assert!(mapping.contains_key("diagram.png"));
        assert_eq!(mapping["images/diagram.png"], mapping["diagram.png"]);
    }
}
